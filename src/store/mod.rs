//! Durable and ephemeral state stores (§2.2, §2.3, §3).

pub mod durable;
pub mod ephemeral;

use crate::common::id::Id;

pub struct LanguageMarker;
pub struct SessionMarker;
pub struct ExecutionMarker;

pub type LanguageId = Id<LanguageMarker>;
pub type SessionId = Id<SessionMarker>;
pub type ExecutionId = Id<ExecutionMarker>;
