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

//! Effective status reads served to gateways.

use chrono::{DateTime, Utc};
use fluxion_fleet_types::{EffectiveStatus, GatewayConfigView, NodeRef, Optimizer};
use futures_util::future::try_join_all;
use std::sync::Arc;

use crate::error::{FleetError, Result};
use crate::traits::TreeStore;

#[derive(Clone)]
pub struct StatusReader {
    store: Arc<dyn TreeStore>,
}

impl std::fmt::Debug for StatusReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReader")
            .field("store", &self.store.name())
            .finish()
    }
}

impl StatusReader {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    /// Status of one optimizer with any bypass schedule evaluated at `now`
    pub async fn effective_status(&self, optimizer_id: &str, now: DateTime<Utc>) -> Result<EffectiveStatus> {
        let optimizer = self
            .store
            .optimizer(optimizer_id)
            .await?
            .ok_or_else(|| FleetError::not_found(&NodeRef::optimizer(optimizer_id)))?;
        self.status_of(optimizer, now).await
    }

    async fn status_of(&self, optimizer: Optimizer, now: DateTime<Utc>) -> Result<EffectiveStatus> {
        let settings = if optimizer.is_setting {
            self.store.pending_settings(&optimizer.id).await?
        } else {
            None
        };
        Ok(EffectiveStatus {
            is_bypass: optimizer.is_bypass.effective(now),
            is_reset: optimizer.is_reset,
            is_setting: optimizer.is_setting,
            settings,
            optimizer_id: optimizer.id,
        })
    }

    /// Everything a gateway pulls to configure itself and its optimizers
    pub async fn gateway_config(&self, gateway_id: &str, now: DateTime<Utc>) -> Result<GatewayConfigView> {
        let node = NodeRef::gateway(gateway_id);
        let gateway = self
            .store
            .gateway(gateway_id)
            .await?
            .ok_or_else(|| FleetError::not_found(&node))?;
        let ids = self
            .store
            .children(&node)
            .await?
            .ok_or_else(|| FleetError::not_found(&node))?;

        let parent = &node;
        let optimizer = try_join_all(ids.into_iter().map(|id| async move {
            let optimizer = self.store.optimizer(&id).await?.ok_or_else(|| {
                FleetError::Inconsistent {
                    parent: parent.clone(),
                    child: NodeRef::optimizer(&id),
                }
            })?;
            self.status_of(optimizer, now).await
        }))
        .await?;

        Ok(GatewayConfigView {
            gateway_id: gateway.id,
            config: gateway.configured,
            ready_to_config: gateway.ready_to_config,
            optimizer,
        })
    }
}
