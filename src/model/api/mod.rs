pub mod auth;
pub mod ballot;
pub mod committee;
pub mod member;
pub mod vote;
