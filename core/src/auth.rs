//! Principal, capability, and token-hashing model for the coordination
//! server's two-principal auth scheme: a single admin token, and one
//! token per agent.
//!
//! Unlike the teacher's OAuth scope model (`mcp-protocol::auth::McpScope`,
//! four scopes checked against a bearer token's scope list), this crate has
//! exactly two kinds of caller and a fixed, per-tool capability table —
//! there is no token-issuing flow to model.

use sha2::{Digest, Sha256};

use crate::{
    error::{CoreError, Result},
    models::AgentStatus,
};

/// Every capability a tool call can require. One tool requires exactly one
/// of these; `Capability::required_for` in the dispatcher's tool table maps
/// tool name to capability (see `mcp-protocol::dispatcher`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    TaskCreate,
    TaskAssign,
    TaskStatus,
    TaskNote,
    TaskView,
    PhaseCreate,
    PhaseAdvance,
    RagIndex,
    RagSearch,
    ContextRead,
    ContextWrite,
}

impl Capability {
    /// Read-only capabilities remain usable by a terminated agent's token;
    /// everything else requires an active agent or an admin.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Capability::TaskView | Capability::RagSearch | Capability::ContextRead
        )
    }

    /// `Some(true)` if only an admin may exercise this capability, `Some(false)`
    /// if any active agent may too.
    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            Capability::TaskAssign | Capability::PhaseCreate | Capability::PhaseAdvance | Capability::RagIndex
        )
    }
}

/// The caller of a tool call, already resolved from its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin,
    Agent {
        agent_id: String,
        status: AgentStatus,
    },
}

impl Principal {
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Principal::Admin => None,
            Principal::Agent { agent_id, .. } => Some(agent_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin)
    }
}

/// Check whether `principal` may exercise `capability`.
///
/// A terminated agent keeps its read-only capabilities (Open Question 4):
/// an agent that stopped mid-run can still be consulted for context, but
/// cannot mutate the graph. Admin-only capabilities reject any agent,
/// active or not.
pub fn authorize(principal: &Principal, capability: Capability) -> Result<()> {
    match principal {
        Principal::Admin => Ok(()),
        Principal::Agent { agent_id, status } => {
            if capability.admin_only() {
                return Err(CoreError::unauthorized(format!(
                    "capability requires admin, agent '{agent_id}' is not admin"
                )));
            }
            match status {
                AgentStatus::Active => Ok(()),
                AgentStatus::Terminated if capability.is_read_only() => Ok(()),
                AgentStatus::Terminated => Err(CoreError::unauthorized(format!(
                    "agent '{agent_id}' is terminated and this capability is not read-only"
                ))),
            }
        }
    }
}

/// Whether `force=true` may bypass a `DependencyNotMet` check for this
/// principal. Only admin callers get this bypass (Open Question 2); a
/// non-admin caller passing `force` is an authorization error, not a
/// silently-ignored flag.
pub fn authorize_force_bypass(principal: &Principal) -> Result<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(CoreError::unauthorized(
            "force may only be used by the admin principal",
        ))
    }
}

/// Hash a bearer token for storage and comparison. Tokens are never stored
/// or logged in cleartext; only this hash lives in the `agents` table.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
