//! [`DirectoryConnection`] over LDAPS using `ldap3`.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry};
use tracing::{debug, info, instrument, warn};

use crate::config::DirectoryConfig;
use crate::connection::DirectoryConnection;
use crate::entry::{DirectoryEntry, SearchDepth};
use crate::error::{rc, DirectoryError, DirectoryResult};

/// A bound connection to the first reachable server of the pool.
///
/// The handle is shared by every call for the life of the adapter.
pub struct LdapConnection {
    ldap: Ldap,
    server: String,
    primary: String,
    timeout: Duration,
    settings: LdapConnSettings,
}

impl LdapConnection {
    /// Try each configured server in order and bind the service principal
    /// on the first one that answers.
    #[instrument(skip(config), fields(servers = ?config.servers))]
    pub async fn connect(config: &DirectoryConfig) -> DirectoryResult<Self> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(config.timeout)
            .set_no_tls_verify(config.no_tls_verify);

        let mut last_error = None;
        for server in &config.servers {
            let attempt = async {
                let mut ldap = open(server, settings.clone()).await?;
                let bound = simple_bind(
                    &mut ldap,
                    &config.bind_principal,
                    config.bind_password.expose(),
                    config.timeout,
                )
                .await?;
                if !bound {
                    return Err(DirectoryError::Connectivity(format!(
                        "service bind rejected for {}",
                        config.bind_principal
                    )));
                }
                Ok(ldap)
            };
            match attempt.await {
                Ok(ldap) => {
                    info!(server = %server, "Directory connection established");
                    return Ok(Self {
                        ldap,
                        server: server.clone(),
                        primary: config.servers[0].clone(),
                        timeout: config.timeout,
                        settings,
                    });
                }
                Err(e) => {
                    warn!(server = %server, error = %e, "Directory server unavailable");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DirectoryError::Connectivity("no directory servers configured".to_string())
        }))
    }

    /// URL of the server this connection is bound to.
    pub fn server(&self) -> &str {
        &self.server
    }

    fn handle(&self) -> Ldap {
        let mut ldap = self.ldap.clone();
        ldap.with_timeout(self.timeout);
        ldap
    }
}

/// Connect and spawn the connection driver.
async fn open(url: &str, settings: LdapConnSettings) -> DirectoryResult<Ldap> {
    debug!(url = %url, "Connecting to directory server");
    let (conn, ldap) = LdapConnAsync::with_settings(settings, url)
        .await
        .map_err(|e| DirectoryError::Connectivity(format!("{url}: {e}")))?;

    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            warn!(error = %e, "Directory connection driver error");
        }
    });

    Ok(ldap)
}

/// `Ok(false)` on invalid credentials, error on anything else non-zero.
async fn simple_bind(
    ldap: &mut Ldap,
    principal: &str,
    password: &str,
    timeout: Duration,
) -> DirectoryResult<bool> {
    let result = ldap
        .with_timeout(timeout)
        .simple_bind(principal, password)
        .await
        .map_err(classify)?;
    match result.rc {
        rc::SUCCESS => Ok(true),
        rc::INVALID_CREDENTIALS => Ok(false),
        code => Err(DirectoryError::Connectivity(format!(
            "bind failed with code {code}: {}",
            result.text
        ))),
    }
}

/// Map a library error: result codes are classified, everything else is
/// a transport failure.
fn classify(err: LdapError) -> DirectoryError {
    match err {
        LdapError::LdapResult { result } => {
            DirectoryError::from_rc(result.rc, &result.text, &result.matched)
        }
        other => DirectoryError::Connectivity(other.to_string()),
    }
}

fn check(result: LdapResult, dn: &str) -> DirectoryResult<()> {
    if result.rc == rc::SUCCESS {
        Ok(())
    } else {
        Err(DirectoryError::from_rc(result.rc, &result.text, dn))
    }
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    #[instrument(skip(self, attrs))]
    async fn search(
        &self,
        base: &str,
        depth: SearchDepth,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let scope = match depth {
            SearchDepth::Base => Scope::Base,
            SearchDepth::Subtree => Scope::Subtree,
        };
        let (entries, _) = self
            .handle()
            .search(base, scope, filter, attrs.to_vec())
            .await
            .map_err(classify)?
            .success()
            .map_err(|e| match classify(e) {
                DirectoryError::NoSuchObject(_) => DirectoryError::NoSuchObject(base.to_string()),
                other => other,
            })?;

        Ok(entries
            .into_iter()
            .filter(|e| !e.is_ref())
            .map(SearchEntry::construct)
            .map(|e| DirectoryEntry {
                dn: e.dn,
                attrs: e.attrs,
                bin_attrs: e.bin_attrs,
            })
            .collect())
    }

    #[instrument(skip(self, attrs))]
    async fn add(
        &self,
        dn: &str,
        object_classes: &[&str],
        attrs: &[(String, Vec<String>)],
    ) -> DirectoryResult<()> {
        let mut attributes: Vec<(String, HashSet<String>)> = vec![(
            "objectClass".to_string(),
            object_classes.iter().map(|c| c.to_string()).collect(),
        )];
        attributes.extend(
            attrs
                .iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(name, values)| (name.clone(), values.iter().cloned().collect())),
        );

        let result = self.handle().add(dn, attributes).await.map_err(classify)?;
        check(result, dn)
    }

    #[instrument(skip(self, values))]
    async fn modify_replace(
        &self,
        dn: &str,
        attr: &str,
        values: Vec<Vec<u8>>,
    ) -> DirectoryResult<()> {
        let change = Mod::Replace(attr.as_bytes().to_vec(), values.into_iter().collect());
        let result = self
            .handle()
            .modify(dn, vec![change])
            .await
            .map_err(classify)?;
        check(result, dn)
    }

    #[instrument(skip(self))]
    async fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> DirectoryResult<()> {
        let result = self
            .handle()
            .modifydn(dn, new_rdn, true, new_superior)
            .await
            .map_err(classify)?;
        check(result, dn)
    }

    #[instrument(skip(self, value))]
    async fn compare(&self, dn: &str, attr: &str, value: &str) -> DirectoryResult<bool> {
        let result = self
            .handle()
            .compare(dn, attr, value)
            .await
            .map_err(classify)?;
        match result.0.rc {
            rc::COMPARE_TRUE => Ok(true),
            rc::COMPARE_FALSE => Ok(false),
            code => Err(DirectoryError::from_rc(code, &result.0.text, dn)),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, dn: &str) -> DirectoryResult<()> {
        let result = self.handle().delete(dn).await.map_err(classify)?;
        check(result, dn)
    }

    #[instrument(skip(self, password))]
    async fn bind_check(&self, principal: &str, password: &str) -> DirectoryResult<bool> {
        let mut ldap = open(&self.primary, self.settings.clone()).await?;
        let outcome = simple_bind(&mut ldap, principal, password, self.timeout).await;
        if let Err(e) = ldap.unbind().await {
            debug!(error = %e, "Unbind after credential check failed");
        }
        outcome
    }

    async fn close(&self) -> DirectoryResult<()> {
        self.ldap.clone().unbind().await.map_err(classify)?;
        info!(server = %self.server, "Directory connection closed");
        Ok(())
    }
}
