//! Player identity: profiles, the session service used during login and the
//! account authentication services behind it.

pub mod auto;

use futures::future::BoxFuture;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use auto::{AuthType, AutoAuthenticationService};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

impl GameProfile {
    pub fn new(id: Uuid, name: String) -> Self {
        GameProfile {
            id,
            name,
            properties: Vec::new(),
        }
    }

    /// Profile of an unauthenticated player. The id is a name based (version 3)
    /// UUID of `"OfflinePlayer:" + name` with no namespace, as vanilla servers do.
    pub fn offline(name: &str) -> Self {
        let digest = Md5::digest(format!("OfflinePlayer:{}", name).as_bytes());
        let id = uuid::Builder::from_md5_bytes(digest.into()).into_uuid();
        GameProfile::new(id, name.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication service unavailable")]
    ServiceUnavailable,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Request(String),
}

/// Session server used while joining: clients announce the join, servers
/// confirm it.
pub trait SessionService: Send + Sync {
    fn join_server<'a>(
        &'a self,
        profile: &'a GameProfile,
        access_token: &'a str,
        server_hash: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>>;

    /// `Ok(None)` means the session server does not know this join.
    fn profile_by_server<'a>(
        &'a self,
        username: &'a str,
        server_hash: &'a str,
    ) -> BoxFuture<'a, Result<Option<GameProfile>, AuthError>>;
}

/// Session service for deployments without network access to a session
/// server. Every call fails with [`AuthError::ServiceUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSessionService;

impl SessionService for UnavailableSessionService {
    fn join_server<'a>(
        &'a self,
        _profile: &'a GameProfile,
        _access_token: &'a str,
        _server_hash: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async { Err(AuthError::ServiceUnavailable) })
    }

    fn profile_by_server<'a>(
        &'a self,
        _username: &'a str,
        _server_hash: &'a str,
    ) -> BoxFuture<'a, Result<Option<GameProfile>, AuthError>> {
        Box::pin(async { Err(AuthError::ServiceUnavailable) })
    }
}

/// An account provider a client logs in with.
pub trait AuthenticationService: Send + Sync {
    fn login(&mut self) -> BoxFuture<'_, Result<(), AuthError>>;
    fn logout(&mut self) -> BoxFuture<'_, Result<(), AuthError>>;

    fn access_token(&self) -> Option<&str>;
    fn set_access_token(&mut self, access_token: Option<String>);
    fn is_logged_in(&self) -> bool;

    fn username(&self) -> Option<&str>;
    fn set_username(&mut self, username: Option<String>);
    fn password(&self) -> Option<&str>;
    fn set_password(&mut self, password: Option<String>);

    fn properties(&self) -> &[Property];
    fn available_profiles(&self) -> &[GameProfile];
    fn selected_profile(&self) -> Option<&GameProfile>;
}
