//! Identity service: authentication, users, companies and the RBAC rules
//! that guard them.

pub mod app;
pub mod bootstrap;
pub mod middleware;
