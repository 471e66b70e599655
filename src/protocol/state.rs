use crate::error::{LodestoneError, Result};

/// The coarse connection phase gating which packets are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubProtocol {
    Handshake,
    Status,
    Login,
    Game,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server.
    Serverbound,
    /// Server to client.
    Clientbound,
}

/// Which side of the connection a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn inbound(&self) -> Direction {
        match self {
            Role::Client => Direction::Clientbound,
            Role::Server => Direction::Serverbound,
        }
    }

    pub fn outbound(&self) -> Direction {
        match self {
            Role::Client => Direction::Serverbound,
            Role::Server => Direction::Clientbound,
        }
    }
}

/// The `next_state` field of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeIntent {
    Status,
    Login,
}

impl HandshakeIntent {
    pub fn id(&self) -> i32 {
        match self {
            HandshakeIntent::Status => 1,
            HandshakeIntent::Login => 2,
        }
    }

    pub fn from_id(id: i32) -> Result<Self> {
        match id {
            1 => Ok(HandshakeIntent::Status),
            2 => Ok(HandshakeIntent::Login),
            other => Err(LodestoneError::InvalidIntent(other)),
        }
    }

    pub fn target(&self) -> SubProtocol {
        match self {
            HandshakeIntent::Status => SubProtocol::Status,
            HandshakeIntent::Login => SubProtocol::Login,
        }
    }
}

/// Current sub-protocol of one connection plus every state it has passed through.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: SubProtocol,
    history: Vec<SubProtocol>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            current: SubProtocol::Handshake,
            history: vec![SubProtocol::Handshake],
        }
    }

    pub fn current(&self) -> SubProtocol {
        self.current
    }

    pub fn history(&self) -> &[SubProtocol] {
        &self.history
    }

    pub fn is_legal(from: SubProtocol, to: SubProtocol) -> bool {
        matches!(
            (from, to),
            (SubProtocol::Handshake, SubProtocol::Status)
                | (SubProtocol::Handshake, SubProtocol::Login)
                | (SubProtocol::Login, SubProtocol::Game)
        )
    }

    pub fn transition(&mut self, to: SubProtocol) -> Result<()> {
        if !Self::is_legal(self.current, to) {
            return Err(LodestoneError::IllegalTransition {
                from: self.current,
                to,
            });
        }
        self.current = to;
        self.history.push(to);
        Ok(())
    }
}
