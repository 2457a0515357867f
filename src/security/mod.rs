/*!
 * Security Module
 * Command validation seam consulted before any process is admitted
 */

pub mod validator;

pub use validator::{BasicCommandValidator, CommandValidator, PermitAll};
