//! Seeds accounts from `[[bootstrap.users]]` on startup.
//!
//! Registration over HTTP is disabled, so this is the only way to create
//! password accounts. Existing emails are left untouched.

use tracing::{info, warn};

use crate::auth::{AuthError, hash_password};
use crate::config::BootstrapConfig;
use crate::ledger::{Ledger, LedgerError};

/// Create missing bootstrap users. Returns how many were created.
pub fn bootstrap_users(ledger: &Ledger, config: &BootstrapConfig) -> Result<usize, AuthError> {
    let mut created = 0;
    for user in &config.users {
        if ledger.user_by_email(&user.email).is_some() {
            info!(email = %user.email, "Bootstrap user already exists");
            continue;
        }
        let hash = hash_password(&user.password)?;
        match ledger.create_user(&user.name, &user.email, hash) {
            Ok(_) => {
                info!(email = %user.email, "Bootstrap user created");
                created += 1;
            }
            Err(LedgerError::Conflict(_)) => {}
            Err(e) => warn!(email = %user.email, error = %e, "Bootstrap user skipped"),
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::config::BootstrapUser;

    #[test]
    fn creates_each_user_once() {
        let ledger = Ledger::new();
        let config = BootstrapConfig {
            users: vec![BootstrapUser {
                name: "Asha".into(),
                email: "asha@example.com".into(),
                password: "Secret123".into(),
            }],
        };
        assert_eq!(bootstrap_users(&ledger, &config).unwrap(), 1);
        assert_eq!(bootstrap_users(&ledger, &config).unwrap(), 0);

        let user = ledger.user_by_email("asha@example.com").unwrap();
        assert!(verify_password("Secret123", &user.password_hash));
    }
}
