//! Mutating admission webhooks of the metal extension
//!
//! The host renders control plane components, etcd, OS configs and secrets
//! into the seed and sends them through these webhooks before persisting
//! them. Each webhook is a [`Mutator`] working on a typed object; the
//! [`server`] turns the difference into a JSONPatch.
//!
//! Webhooks:
//! - `controlplane`: kube-apiserver, kube-controller-manager, worker OS config
//! - `controlplaneexposure`: apiserver advertise address, etcd fallback
//! - `seedprovider`: etcd storage and backup
//! - `cloudprovider`: finalizer of the credentials secret
//! - `shoot`: vpn-shoot in the shoot

#![deny(missing_docs)]

pub mod cloudprovider;
pub mod context;
pub mod controlplane;
pub mod ensure;
pub mod etcd;
pub mod exposure;
pub mod registration;
pub mod server;
pub mod shoot;

pub use context::{MutableObject, MutationContext, Mutator, ObjectKind};
pub use server::{default_mutators, webhook_router, WebhookState};
