mod channels;
mod entries;
mod schema;
mod types;

pub use schema::Database;
pub use types::{ChannelUpdate, DatabaseError, NewChannel};
