//! TLS client configuration for ldaps:// and StartTLS: system roots plus an optional CA bundle.

use anyhow::{Context, Result};
use rustls::{ClientConfig, RootCertStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Build a rustls ClientConfig trusting the system roots and, if given, the PEM CA file.
pub fn load_client_config(ca_file: Option<&str>) -> Result<Arc<ClientConfig>> {
    let ca_pem = match ca_file {
        Some(path) => Some(fs::read(path).with_context(|| format!("Open CA file: {}", path))?),
        None => None,
    };
    client_config_with_ca(ca_pem.as_deref())
}

/// Build ClientConfig from optional PEM bytes (single cert or bundle).
pub fn client_config_with_ca(extra_ca_pem: Option<&[u8]>) -> Result<Arc<ClientConfig>> {
    let mut root_store = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let ders: Vec<Vec<u8>> = certs.into_iter().map(|c| c.0).collect();
            let (added, ignored) = root_store.add_parsable_certificates(&ders);
            debug!("Loaded {} system CA certs ({} ignored)", added, ignored);
        }
        Err(e) => warn!("Load system CA certs: {}", e),
    }
    if let Some(pem) = extra_ca_pem {
        let ders = parse_pem_certs(pem)?;
        let (added, _) = root_store.add_parsable_certificates(&ders);
        if added == 0 {
            anyhow::bail!("No usable CA certificates in PEM data");
        }
    }
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn parse_pem_certs(pem: &[u8]) -> Result<Vec<Vec<u8>>> {
    let certs = rustls_pemfile::certs(&mut std::io::Cursor::new(pem)).context("Parse CA PEM")?;
    if certs.is_empty() {
        anyhow::bail!("No certificates in PEM data");
    }
    Ok(certs)
}

/// Check the CA file exists before connecting, for clearer startup errors.
pub fn validate_ca_file(path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        anyhow::bail!("CA file not found: {}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_client_config_system_roots_only() {
        assert!(client_config_with_ca(None).is_ok());
    }

    #[test]
    fn test_pem_without_certificates() {
        let err = client_config_with_ca(Some(b"not a pem file")).unwrap_err();
        assert!(err.to_string().contains("No certificates"));
    }

    #[test]
    fn test_missing_ca_file() {
        assert!(load_client_config(Some("/nonexistent/ca.pem")).is_err());
        assert!(validate_ca_file("/nonexistent/ca.pem").is_err());
    }

    #[test]
    fn test_ca_file_without_certificates() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"# empty bundle\n").unwrap();
        file.flush().unwrap();
        let path = file.path().to_str().unwrap();
        assert!(validate_ca_file(path).is_ok());
        assert!(load_client_config(Some(path)).is_err());
    }
}
