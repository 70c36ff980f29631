pub mod id;

pub use id::{ActiveConnectionId, ActivityId, ConnectionId, UserId};
