//! Authentication and tenant authorization.
//!
//! Every API request carries an `Authorization: Bearer <jwt>` issued by the external identity
//! provider. Handlers declare what they need through extractors:
//!
//! - [`TenantContext`](tenant::TenantContext): the token is verified and the identity resolved to
//!   its organization, provisioning a new one on first contact. Enough for reads.
//! - [`ActiveTenant`](subscription::ActiveTenant): additionally passes the subscription gate.
//!   Required by every write to tenant data.
//! - [`AdminTenant`](tenant::AdminTenant): additionally requires the `admin` role.

pub mod identity;
pub mod subscription;
pub mod tenant;
