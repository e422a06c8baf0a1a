//! # ldapkit
//!
//! Directory lookups over LDAP for the reconciliation engine.
//!
//! [`LdapDirectory`] implements [`reconcile::DirectoryLookup`]: it resolves a
//! group (by DN or by name) to the user ids of its members, and looks up
//! display attributes of a single user.
//!
//! ## Example
//!
//! ```no_run
//! use ldapkit::{LdapConfig, LdapDirectory};
//!
//! let mut config = LdapConfig::new("ldaps://racf.example.com:636", "o=example");
//! config.bind_dn = Some("cn=sync,o=example".into());
//!
//! let directory = LdapDirectory::connect(config, Some("secret")).unwrap();
//! for id in directory.group_members("G-Admins").unwrap() {
//!     println!("{id}");
//! }
//! ```

pub mod config;
pub mod directory;
pub mod dn;
pub mod error;

pub use config::LdapConfig;
pub use directory::LdapDirectory;
pub use error::{Error, Result};
