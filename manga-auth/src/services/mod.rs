pub mod authentication;
pub mod mailer;
pub mod password;
pub mod token_service;
pub mod verification;
