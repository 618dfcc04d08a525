//! End-to-end provisioning scenarios driven through mock targets.

#![allow(clippy::expect_used)]

mod mocks;

mod agent_deploy_log;
mod agent_update;
mod service_readiness;
mod service_registry;
