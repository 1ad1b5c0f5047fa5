pub mod artifact_store;
pub mod connectivity;
pub mod coordinator;
pub mod credentials;
pub mod journal;
pub mod transport;
