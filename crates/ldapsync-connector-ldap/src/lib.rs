//! LDAP directory source.
//!
//! Binds to an LDAP server, searches the configured subtree and hands the
//! raw entries to a vendor plugin that maps them to canonical users.
//!
//! Supported vendors:
//! - Active Directory (`active_directory`): account status from the
//!   `userAccountControl` bitmask, binary `objectGUID`
//! - OpenLDAP (`openldap`): account status from `pwdAccountLockedTime`

pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod vendor;

pub use config::LdapConfig;
pub use connection::LdapSource;
pub use error::{DirectoryError, DirectoryResult};
pub use registry::{build_directory, DirectoryKind};
