pub mod activity;
pub mod company;
pub mod dashboard;
pub mod requests;
pub mod user;
