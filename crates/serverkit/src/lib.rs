//! # serverkit
//!
//! Reads and writes access state on collaboration servers through their
//! HTTP/JSON administration API.
//!
//! [`HttpConnector`] implements [`reconcile::ServerConnector`]: it logs in
//! with the account configured for a server and hands out an
//! [`HttpSession`] that carries the session token on every request.
//!
//! ## Endpoints
//!
//! | Construct             | Path                           | Query                  |
//! |-----------------------|--------------------------------|------------------------|
//! | Permission group      | `/api/permissions/members`     | `group`                |
//! | License               | `/api/licenses/assignees`      | `license`              |
//! | Area administrators   | `/api/areas/administrators`    | `area`                 |
//! | Area members          | `/api/areas/members`           | `area`                 |
//! | Process role          | `/api/areas/roles/members`     | `area`, `role`         |
//!
//! `GET` lists holders, `PUT ...&user=U` grants, `DELETE ...&user=U` revokes.

pub mod endpoint;
pub mod error;
pub mod session;

pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use session::{DEFAULT_TIMEOUT, HttpConnector, HttpSession};
