pub mod response;
pub mod rest;
