pub mod codec;
pub mod crypt;
pub mod session;

pub use session::{Control, Incoming, Session, SessionContext, SessionEvent, SessionHandle};
