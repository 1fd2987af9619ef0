pub mod ballot;
pub mod branding;
pub mod committee;
pub mod member;
pub mod vote;
