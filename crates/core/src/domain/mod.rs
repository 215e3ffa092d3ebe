pub mod capability;
pub mod conversation;
pub mod credentials;
pub mod turn;
