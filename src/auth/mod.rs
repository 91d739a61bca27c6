pub mod audit;
pub mod credentials;
pub mod extractors;
pub mod jwt;
pub mod keys;
pub mod logout;
pub mod principal;
pub mod rotation;
pub mod tokens;
