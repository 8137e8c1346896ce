// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Gateway provisioning handshake.
//!
//! A new gateway announces it is ready, confirms that every optimizer assigned
//! to it is reachable, pulls its installation property, and finally
//! acknowledges that it applied the configuration.

use fluxion_fleet_types::{Gateway, InstallationProperty, NodeRef};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{FleetError, Result};
use crate::traits::{GatewayFlags, TreeStore};

#[derive(Clone)]
pub struct GatewayProvisioning {
    store: Arc<dyn TreeStore>,
}

impl std::fmt::Debug for GatewayProvisioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayProvisioning")
            .field("store", &self.store.name())
            .finish()
    }
}

impl GatewayProvisioning {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    async fn gateway(&self, gateway_id: &str) -> Result<Gateway> {
        self.store
            .gateway(gateway_id)
            .await?
            .ok_or_else(|| FleetError::not_found(&NodeRef::gateway(gateway_id)))
    }

    async fn assigned(&self, gateway_id: &str) -> Result<Vec<String>> {
        let node = NodeRef::gateway(gateway_id);
        self.store
            .children(&node)
            .await?
            .ok_or_else(|| FleetError::not_found(&node))
    }

    pub async fn mark_ready_to_config(&self, gateway_id: &str) -> Result<()> {
        self.gateway(gateway_id).await?;
        self.store
            .set_gateway_flags(
                gateway_id,
                GatewayFlags {
                    ready_to_config: Some(true),
                    ..GatewayFlags::default()
                },
            )
            .await?;
        info!(gateway = gateway_id, "Gateway ready to config");
        Ok(())
    }

    /// Check the ids a gateway reports as online against its assigned optimizers.
    ///
    /// Blank ids are ignored. On an exact match the gateway becomes configured;
    /// otherwise the missing optimizers are reported as `PartialOffline`.
    pub async fn confirm_online(&self, gateway_id: &str, reported: &[String]) -> Result<()> {
        self.gateway(gateway_id).await?;
        let assigned: BTreeSet<String> = self
            .assigned(gateway_id)
            .await?
            .into_iter()
            .map(|id| id.trim().to_owned())
            .collect();
        let online: BTreeSet<String> = reported
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect();

        if assigned != online {
            let offline: Vec<String> = assigned.difference(&online).cloned().collect();
            warn!(
                gateway = gateway_id,
                assigned = assigned.len(),
                online = online.len(),
                ?offline,
                "Not all optimizers are online"
            );
            return Err(FleetError::PartialOffline {
                offline,
                total: assigned.len(),
            });
        }

        self.store
            .set_gateway_flags(
                gateway_id,
                GatewayFlags {
                    configured: Some(true),
                    ready_to_config: Some(false),
                },
            )
            .await?;
        info!(gateway = gateway_id, optimizers = assigned.len(), "All optimizers are online");
        Ok(())
    }

    /// Network credentials and roster, withheld until the gateway is configured
    pub async fn installation_property(&self, gateway_id: &str) -> Result<InstallationProperty> {
        let gateway = self.gateway(gateway_id).await?;
        if !gateway.configured {
            return Ok(InstallationProperty::Pending {
                gateway_id: gateway.id,
                property: None,
            });
        }
        let optimizer_list = self.assigned(gateway_id).await?;
        Ok(InstallationProperty::Configured {
            gateway_id: gateway.id,
            ssid: gateway.network_ssid,
            password: gateway.network_password,
            optimizer_list,
        })
    }

    /// The gateway applied its configuration; clear the flag
    pub async fn acknowledge_configured(&self, gateway_id: &str) -> Result<()> {
        self.gateway(gateway_id).await?;
        self.store
            .set_gateway_flags(
                gateway_id,
                GatewayFlags {
                    configured: Some(false),
                    ..GatewayFlags::default()
                },
            )
            .await?;
        info!(gateway = gateway_id, "Gateway acknowledged configuration");
        Ok(())
    }
}
