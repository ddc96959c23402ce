//! Directory handle with a cached vendor.

use tokio::sync::OnceCell;
use tracing::{debug, info};

use dirgraph_connector::error::{ConnectorError, ConnectorResult};
use dirgraph_connector::traits::DirectoryClient;

use crate::vendor::LdapVendor;

/// A directory client together with the vendor detected for it.
///
/// Detection reads the root DSE on first use. Concurrent first callers share
/// the same read, and the result lives as long as the handle.
pub struct LdapDirectory<C> {
    client: C,
    vendor: OnceCell<LdapVendor>,
}

impl<C: DirectoryClient> LdapDirectory<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            vendor: OnceCell::new(),
        }
    }

    /// Create a handle with a known vendor, skipping detection.
    pub fn with_vendor(client: C, vendor: LdapVendor) -> Self {
        Self {
            client,
            vendor: OnceCell::new_with(Some(vendor)),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// The vendor of this directory, detecting it on first call.
    ///
    /// A failed detection is not cached, so a later call retries.
    pub async fn vendor(&self) -> ConnectorResult<LdapVendor> {
        let vendor = self
            .vendor
            .get_or_try_init(|| async {
                debug!(client = %self.client.display_name(), "Reading root DSE for vendor detection");
                let root = self.client.root_record().await?;
                let vendor = LdapVendor::detect(root.as_ref());
                info!(client = %self.client.display_name(), vendor = %vendor, "Detected directory vendor");
                Ok::<_, ConnectorError>(vendor)
            })
            .await?;
        Ok(*vendor)
    }

    /// The vendor if it has already been detected.
    pub fn cached_vendor(&self) -> Option<LdapVendor> {
        self.vendor.get().copied()
    }
}

impl<C> std::fmt::Debug for LdapDirectory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("vendor", &self.vendor.get())
            .finish_non_exhaustive()
    }
}
