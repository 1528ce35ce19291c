//! Tool handler implementations for the task graph engine (C3), the Phase
//! lifecycle, and the RAG pipeline (C7).
//!
//! Generalizes the teacher's `mcp-protocol/src/handler.rs` — one method per
//! tool on `McpTaskHandler`, calling straight into `TaskRepository` — into
//! free functions over [`HandlerContext`]. Each function owns exactly one
//! tool's business rules; `dispatcher.rs` owns capability/migration-gate
//! checks and audit recording, so these functions assume the caller is
//! already authorized and the migration gate (if relevant) is already
//! clear.

use std::collections::HashSet;
use std::time::Duration;

use agent_mcp_core::{
    embeddings::cosine_similarity,
    error::{CoreError, Result as CoreResult},
    models::{
        rollup_phase, rollup_workstream, AgentStatus, EmbeddingChunk, NewTask, Priority,
        ProjectContextEntry, Rollup, SourceKind, Task, TaskFilter, TaskMirror, TaskNote,
        TaskRole, TaskStatus, PHASE_IDS,
    },
    validation::TaskValidator,
    Principal,
};
use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::dispatcher::HandlerContext;
use crate::error::McpError;
use crate::serialization::{deserialize_params, serialize_task, serialize_tasks};

fn actor_id(principal: &Principal) -> String {
    principal.agent_id().unwrap_or("admin").to_string()
}

// ---------------------------------------------------------------------
// health_check
// ---------------------------------------------------------------------

pub async fn health_check(ctx: &HandlerContext) -> Result<Value, McpError> {
    ctx.repository.health_check().await?;
    Ok(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------
// create_task
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskParams {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Proceed with creation even though RAG surfaced a likely duplicate.
    #[serde(default)]
    pub override_duplicate: bool,
}

pub async fn create_task(
    ctx: &HandlerContext,
    principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: CreateTaskParams = deserialize_params(arguments)?;
    let created_by = actor_id(principal);

    let new_task = NewTask {
        title: params.title,
        description: params.description,
        parent_task_id: params.parent_task_id.clone(),
        priority: params.priority,
        depends_on: params.depends_on,
        created_by,
    };
    TaskValidator::validate_new_task(&new_task)?;

    {
        let mirror = ctx.mirror.read().await;

        if let Some(parent_id) = &new_task.parent_task_id {
            let parent = mirror
                .get(parent_id)
                .ok_or_else(|| CoreError::not_found(format!("parent task '{parent_id}' not found")))?;
            if parent.status == TaskStatus::Cancelled {
                return Err(McpError::from(CoreError::conflict(format!(
                    "parent task '{parent_id}' is cancelled"
                ))));
            }
            if parent.is_phase() {
                if parent.status == TaskStatus::Completed {
                    return Err(McpError::from(CoreError::phase_closed(parent_id)));
                }
                validate_phase_ordering(&mirror, parent_id)?;
            }
        }

        for dep in &new_task.depends_on {
            mirror
                .get(dep)
                .ok_or_else(|| CoreError::not_found(format!("dependency '{dep}' not found")))?;
        }
    }

    maybe_reject_duplicate(ctx, &new_task, params.override_duplicate).await?;

    let task_id = format!("task-{}", uuid::Uuid::new_v4());
    let task = ctx.repository.create_task(&task_id, new_task).await?;
    let task = ctx
        .repository
        .append_note(&task_id, TaskNote {
            timestamp: Utc::now(),
            author: task.created_by.clone(),
            content: "task created".to_string(),
        })
        .await?;

    {
        let mut mirror = ctx.mirror.write().await;
        mirror.insert(task.clone());
    }
    recompute_ancestor_rollups(ctx, &task_id).await?;

    Ok(serialize_task(&task))
}

/// Consult the RAG index for a likely duplicate before creating a task, per
/// the task-placement hook in §4.7. A no-op unless both
/// `enable_task_placement_rag` is set and an embedding provider is wired up.
async fn maybe_reject_duplicate(
    ctx: &HandlerContext,
    new_task: &NewTask,
    override_duplicate: bool,
) -> Result<(), McpError> {
    if !ctx.rag.enable_task_placement_rag {
        return Ok(());
    }
    let Some(provider) = &ctx.embeddings else {
        return Ok(());
    };

    let query = format!("{}\n{}", new_task.title, new_task.description);
    let embedding = match provider.embed_batch(&[query]).await {
        Ok(mut batch) if !batch.is_empty() => batch.remove(0),
        Ok(_) => return Ok(()),
        Err(e) => {
            warn!(error = %e, "embedding call failed during duplicate check, proceeding without it");
            return Ok(());
        }
    };

    let chunks = ctx.repository.all_chunks(None).await?;
    let best = chunks
        .iter()
        .map(|c| (c, cosine_similarity(&embedding, &c.embedding)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    if let Some((chunk, score)) = best {
        if agent_mcp_core::rag::exceeds_duplication_threshold(score, ctx.rag.task_duplication_threshold) {
            if ctx.rag.allow_rag_override && override_duplicate {
                return Ok(());
            }
            return Err(McpError::from(CoreError::conflict(format!(
                "likely duplicate of existing content in '{}' (similarity {:.2})",
                chunk.source_ref, score
            ))));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// assign_task
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AssignTaskParams {
    pub agent_id: String,
    pub task_id: String,
}

pub async fn assign_task(
    ctx: &HandlerContext,
    _principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: AssignTaskParams = deserialize_params(arguments)?;

    let agent = ctx
        .repository
        .get_agent(&params.agent_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("agent '{}' not found", params.agent_id)))?;
    if agent.status == AgentStatus::Terminated {
        return Err(McpError::from(CoreError::conflict(format!(
            "agent '{}' is terminated and cannot receive new assignments",
            params.agent_id
        ))));
    }

    {
        let mirror = ctx.mirror.read().await;
        let task = mirror
            .get(&params.task_id)
            .ok_or_else(|| CoreError::task_not_found(&params.task_id))?;
        if ancestor_chain_has_cancelled(&mirror, task) {
            return Err(McpError::from(CoreError::conflict(format!(
                "task '{}' has a cancelled ancestor",
                params.task_id
            ))));
        }
    }

    let task = ctx
        .repository
        .assign_task(&params.task_id, Some(&params.agent_id))
        .await?;
    ctx.mirror.write().await.insert(task.clone());
    Ok(serialize_task(&task))
}

fn ancestor_chain_has_cancelled(mirror: &TaskMirror, task: &Task) -> bool {
    let mut current = task.parent_task.clone();
    while let Some(parent_id) = current {
        match mirror.get(&parent_id) {
            Some(parent) if parent.status == TaskStatus::Cancelled => return true,
            Some(parent) => current = parent.parent_task.clone(),
            None => break,
        }
    }
    false
}

// ---------------------------------------------------------------------
// update_task_status
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateTaskStatusParams {
    pub task_id: String,
    pub new_status: TaskStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub force: bool,
}

pub async fn update_task_status(
    ctx: &HandlerContext,
    principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: UpdateTaskStatusParams = deserialize_params(arguments)?;

    if params.force {
        agent_mcp_core::authorize_force_bypass(principal)?;
    }

    let task = ctx
        .repository
        .get_task(&params.task_id)
        .await?
        .ok_or_else(|| CoreError::task_not_found(&params.task_id))?;
    TaskValidator::validate_state_transition(&task, params.new_status)?;

    if params.new_status == TaskStatus::InProgress && !params.force {
        for dep_id in &task.depends_on_tasks {
            let dep = ctx
                .repository
                .get_task(dep_id)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("dependency '{dep_id}' not found")))?;
            if dep.status != TaskStatus::Completed {
                return Err(McpError::from(CoreError::dependency_not_met(
                    &params.task_id,
                    dep_id,
                )));
            }
        }
    }

    let updated = ctx
        .repository
        .set_task_status(&params.task_id, params.new_status)
        .await?;
    let updated = if let Some(note) = params.note {
        TaskValidator::validate_note_content(&note)?;
        ctx.repository
            .append_note(
                &params.task_id,
                TaskNote {
                    timestamp: Utc::now(),
                    author: actor_id(principal),
                    content: note,
                },
            )
            .await?
    } else {
        updated
    };

    ctx.mirror.write().await.insert(updated.clone());
    recompute_ancestor_rollups(ctx, &params.task_id).await?;

    Ok(serialize_task(&updated))
}

// ---------------------------------------------------------------------
// add_task_note
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddTaskNoteParams {
    pub task_id: String,
    pub content: String,
}

pub async fn add_task_note(
    ctx: &HandlerContext,
    principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: AddTaskNoteParams = deserialize_params(arguments)?;
    TaskValidator::validate_note_content(&params.content)?;

    let task = ctx
        .repository
        .append_note(
            &params.task_id,
            TaskNote {
                timestamp: Utc::now(),
                author: actor_id(principal),
                content: params.content,
            },
        )
        .await?;
    ctx.mirror.write().await.insert(task.clone());
    Ok(serialize_task(&task))
}

// ---------------------------------------------------------------------
// view_tasks
// ---------------------------------------------------------------------

pub async fn view_tasks(
    ctx: &HandlerContext,
    _principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let filter: TaskFilter = if arguments.is_null() {
        TaskFilter::default()
    } else {
        deserialize_params(arguments)?
    };
    let tasks = ctx.repository.list_tasks(filter).await?;
    Ok(json!({ "tasks": serialize_tasks(&tasks) }))
}

// ---------------------------------------------------------------------
// create_phase
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePhaseParams {
    pub phase_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_phase(
    ctx: &HandlerContext,
    principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: CreatePhaseParams = deserialize_params(arguments)?;
    let phase_id = resolve_phase_id(&params.phase_type)?;

    {
        let mirror = ctx.mirror.read().await;
        if mirror.get(phase_id).is_some() {
            return Err(McpError::from(CoreError::conflict(format!(
                "phase '{phase_id}' already exists"
            ))));
        }
        validate_phase_ordering(&mirror, phase_id)?;
    }

    let new_task = NewTask {
        title: params.name.unwrap_or_else(|| default_phase_title(phase_id)),
        description: params
            .description
            .unwrap_or_else(|| format!("Coordination phase {phase_id}")),
        parent_task_id: None,
        priority: Some(Priority::High),
        depends_on: vec![],
        created_by: actor_id(principal),
    };
    TaskValidator::validate_new_task(&new_task)?;

    let task = ctx.repository.create_task(phase_id, new_task).await?;
    ctx.mirror.write().await.insert(task.clone());
    Ok(serialize_task(&task))
}

fn resolve_phase_id(phase_type: &str) -> Result<&'static str, McpError> {
    if let Some(id) = PHASE_IDS.iter().find(|id| **id == *phase_type) {
        return Ok(id);
    }
    PHASE_IDS
        .iter()
        .find(|id| id.trim_start_matches("phase_").splitn(2, '_').nth(1) == Some(phase_type))
        .copied()
        .ok_or_else(|| McpError::BadRequest(format!("unknown phase_type '{phase_type}'")))
}

fn default_phase_title(phase_id: &str) -> String {
    phase_id
        .trim_start_matches("phase_")
        .replace('_', " ")
        .to_string()
}

/// A Phase may be created (or have tasks attached directly under it) only
/// once every earlier phase in `PHASE_IDS` is `completed`.
fn validate_phase_ordering(mirror: &TaskMirror, phase_id: &str) -> Result<(), McpError> {
    let idx = PHASE_IDS
        .iter()
        .position(|id| *id == phase_id)
        .ok_or_else(|| McpError::BadRequest(format!("'{phase_id}' is not a canonical phase")))?;
    for earlier in &PHASE_IDS[..idx] {
        match mirror.get(earlier) {
            Some(t) if t.status == TaskStatus::Completed => continue,
            _ => {
                return Err(McpError::from(CoreError::conflict(format!(
                    "phase '{earlier}' must be completed before '{phase_id}'"
                ))))
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// view_phase_status
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ViewPhaseStatusParams {
    #[serde(default)]
    pub phase_id: Option<String>,
}

pub async fn view_phase_status(
    ctx: &HandlerContext,
    _principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: ViewPhaseStatusParams = if arguments.is_null() {
        ViewPhaseStatusParams { phase_id: None }
    } else {
        deserialize_params(arguments)?
    };

    let mirror = ctx.mirror.read().await;
    let phase_ids: Vec<&str> = match &params.phase_id {
        Some(id) => vec![id.as_str()],
        None => PHASE_IDS.to_vec(),
    };

    let mut summaries = Vec::new();
    for phase_id in phase_ids {
        let phase = mirror
            .get(phase_id)
            .ok_or_else(|| CoreError::not_found(format!("phase '{phase_id}' not found")))?;
        summaries.push(phase_summary(&mirror, phase));
    }

    if params.phase_id.is_some() {
        Ok(summaries.into_iter().next().unwrap_or(Value::Null))
    } else {
        Ok(json!({ "phases": summaries }))
    }
}

fn phase_summary(mirror: &TaskMirror, phase: &Task) -> Value {
    let workstreams: Vec<&Task> = mirror
        .children(&phase.task_id)
        .into_iter()
        .filter(|t| t.role() == TaskRole::Workstream)
        .collect();

    let rollups: Vec<Rollup> = workstreams
        .iter()
        .map(|ws| rollup_workstream(&collect_descendants(mirror, &ws.task_id)))
        .collect();
    let (completion, can_advance) = rollup_phase(&rollups);

    let blocking: Vec<&str> = workstreams
        .iter()
        .zip(&rollups)
        .filter(|(_, r)| r.status != TaskStatus::Completed)
        .map(|(ws, _)| ws.task_id.as_str())
        .collect();

    let mut active_agents: HashSet<&str> = HashSet::new();
    for ws in &workstreams {
        for descendant in collect_descendants(mirror, &ws.task_id) {
            if let Some(agent) = &descendant.assigned_to {
                active_agents.insert(agent.as_str());
            }
        }
    }

    json!({
        "phase_id": phase.task_id,
        "title": phase.title,
        "status": phase.status,
        "completion": completion,
        "can_advance": can_advance,
        "blocking_workstreams": blocking,
        "active_agents": active_agents.into_iter().collect::<Vec<_>>(),
    })
}

// ---------------------------------------------------------------------
// advance_phase
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AdvancePhaseParams {
    pub current_phase_id: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub terminate_agents: bool,
}

pub async fn advance_phase(
    ctx: &HandlerContext,
    principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: AdvancePhaseParams = deserialize_params(arguments)?;
    if params.force {
        agent_mcp_core::authorize_force_bypass(principal)?;
    }

    let (can_advance, active_agents) = {
        let mirror = ctx.mirror.read().await;
        let phase = mirror
            .get(&params.current_phase_id)
            .ok_or_else(|| CoreError::not_found(format!("phase '{}' not found", params.current_phase_id)))?;
        if !phase.is_phase() {
            return Err(McpError::from(CoreError::bad_request(format!(
                "'{}' is not a phase",
                params.current_phase_id
            ))));
        }

        let workstreams: Vec<&Task> = mirror
            .children(&params.current_phase_id)
            .into_iter()
            .filter(|t| t.role() == TaskRole::Workstream)
            .collect();
        let rollups: Vec<Rollup> = workstreams
            .iter()
            .map(|ws| rollup_workstream(&collect_descendants(&mirror, &ws.task_id)))
            .collect();
        let (_, can_advance) = rollup_phase(&rollups);

        let mut active_agents: HashSet<String> = HashSet::new();
        for ws in &workstreams {
            for descendant in collect_descendants(&mirror, &ws.task_id) {
                if let Some(agent) = &descendant.assigned_to {
                    active_agents.insert(agent.clone());
                }
            }
        }
        (can_advance, active_agents)
    };

    if !can_advance && !params.force {
        return Err(McpError::from(CoreError::conflict(format!(
            "phase '{}' has workstreams that are not yet completed",
            params.current_phase_id
        ))));
    }

    let phase = ctx
        .repository
        .set_task_status(&params.current_phase_id, TaskStatus::Completed)
        .await?;
    ctx.mirror.write().await.insert(phase.clone());

    Ok(json!({
        "phase": serialize_task(&phase),
        "active_agents": active_agents.into_iter().collect::<Vec<_>>(),
        "terminate_agents_requested": params.terminate_agents,
    }))
}

// ---------------------------------------------------------------------
// index_project
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IndexProjectParams {
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub root_dir: Option<String>,
}

pub async fn index_project(
    ctx: &HandlerContext,
    _principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: IndexProjectParams = if arguments.is_null() {
        IndexProjectParams { force: false, root_dir: None }
    } else {
        deserialize_params(arguments)?
    };

    let provider = ctx
        .embeddings
        .as_ref()
        .ok_or_else(|| McpError::Internal("no embedding provider configured".to_string()))?;

    let root = params
        .root_dir
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from(".")));

    let mut files_processed = 0u32;
    let mut chunks_created = 0u32;
    let mut errors = 0u32;

    for path in walk_indexable_files(&root) {
        let source_ref = path
            .strip_prefix(&root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => {
                errors += 1;
                continue;
            }
        };
        let content_hash = sha256_hex(content.as_bytes());

        if !params.force {
            if let Ok(Some(prior)) = ctx.repository.last_indexed_hash(&source_ref).await {
                if prior == content_hash {
                    continue;
                }
            }
        }

        let text_chunks = agent_mcp_core::rag::chunk_text(&content);
        if text_chunks.is_empty() {
            continue;
        }

        let texts: Vec<String> = text_chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = match provider.embed_batch(&texts).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, source_ref, "embedding call failed during indexing");
                errors += 1;
                continue;
            }
        };

        let now = Utc::now();
        let chunks: Vec<EmbeddingChunk> = text_chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddingChunk {
                chunk_id: format!("{source_ref}#{}", chunk.byte_offset),
                source_kind: SourceKind::File,
                source_ref: source_ref.clone(),
                offset: chunk.byte_offset,
                length: chunk.byte_length,
                text: chunk.text,
                embedding,
                indexed_at: now,
            })
            .collect();

        chunks_created += chunks.len() as u32;
        if let Err(e) = ctx.repository.upsert_chunks(&source_ref, chunks).await {
            warn!(error = %e, source_ref, "failed to persist indexed chunks");
            errors += 1;
            continue;
        }
        let _ = ctx.repository.record_indexed_hash(&source_ref, &content_hash).await;
        files_processed += 1;
    }

    Ok(json!({
        "files_processed": files_processed,
        "chunks_created": chunks_created,
        "errors": errors,
    }))
}

const IGNORED_DIR_NAMES: &[&str] = &[".agent", ".git", "target", "node_modules"];

fn walk_indexable_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if path.is_dir() {
                if !IGNORED_DIR_NAMES.contains(&name.as_ref()) {
                    stack.push(path);
                }
            } else {
                out.push(path);
            }
        }
    }
    out
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------
// search_context
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchContextParams {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub source_kind: Option<SourceKind>,
}

pub async fn search_context(
    ctx: &HandlerContext,
    _principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: SearchContextParams = deserialize_params(arguments)?;
    let k = params.k.unwrap_or(5);

    let provider = ctx
        .embeddings
        .as_ref()
        .ok_or_else(|| McpError::Internal("no embedding provider configured".to_string()))?
        .clone();
    let repository = ctx.repository.clone();
    let query = params.query;
    let source_kind = params.source_kind;

    let budget = Duration::from_secs(ctx.rag.query_timeout_secs);
    let search = async move {
        let embedding = provider.embed_batch(&[query]).await?.into_iter().next().unwrap_or_default();
        let chunks = repository.all_chunks(source_kind).await?;
        let mut scored: Vec<(EmbeddingChunk, f32)> = chunks
            .into_iter()
            .map(|c| {
                let score = cosine_similarity(&embedding, &c.embedding);
                (c, score)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
        });
        scored.truncate(k);
        CoreResult::Ok(scored)
    };

    match tokio::time::timeout(budget, search).await {
        Ok(Ok(hits)) => Ok(json!({
            "results": hits.into_iter().map(|(chunk, score)| json!({
                "chunk_id": chunk.chunk_id,
                "source_ref": chunk.source_ref,
                "text": chunk.text,
                "score": score,
            })).collect::<Vec<_>>(),
            "timeout": false,
        })),
        Ok(Err(e)) => Err(McpError::from(e)),
        Err(_) => Ok(json!({ "results": [], "timeout": true })),
    }
}

// ---------------------------------------------------------------------
// get_context / set_context
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetContextParams {
    pub context_key: String,
}

pub async fn get_context(
    ctx: &HandlerContext,
    _principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: GetContextParams = deserialize_params(arguments)?;
    let entry = ctx
        .repository
        .get_context(&params.context_key)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("context key '{}' not found", params.context_key)))?;
    Ok(serde_json::to_value(entry).unwrap_or(Value::Null))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetContextParams {
    pub context_key: String,
    pub value: Value,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn set_context(
    ctx: &HandlerContext,
    principal: &Principal,
    arguments: Value,
) -> Result<Value, McpError> {
    let params: SetContextParams = deserialize_params(arguments)?;
    let entry = ProjectContextEntry {
        context_key: params.context_key,
        value: params.value,
        description: params.description,
        last_updated: Utc::now(),
        updated_by: actor_id(principal),
    };
    ctx.repository.set_context(entry.clone()).await?;
    Ok(serde_json::to_value(entry).unwrap_or(Value::Null))
}

// ---------------------------------------------------------------------
// Shared rollup helpers
// ---------------------------------------------------------------------

fn collect_descendants<'a>(mirror: &'a TaskMirror, root: &str) -> Vec<&'a Task> {
    let mut out = Vec::new();
    let mut frontier: Vec<&'a Task> = mirror.children(root);
    while let Some(task) = frontier.pop() {
        frontier.extend(mirror.children(&task.task_id));
        out.push(task);
    }
    out
}

/// Walk `task_id`'s ancestor chain, writing through the materialized
/// status of every Workstream/Phase whose derived rollup has changed (§4.3,
/// §9 "In-memory mirror").
async fn recompute_ancestor_rollups(ctx: &HandlerContext, task_id: &str) -> Result<(), McpError> {
    let mut mirror = ctx.mirror.write().await;
    let mut current_parent = mirror.get(task_id).and_then(|t| t.parent_task.clone());

    while let Some(ancestor_id) = current_parent {
        let Some(ancestor) = mirror.get(&ancestor_id).cloned() else { break };

        if ancestor.role() == TaskRole::Workstream {
            let descendants = collect_descendants(&mirror, &ancestor_id);
            let rollup = rollup_workstream(&descendants);
            if rollup.status != ancestor.status {
                let updated = ctx.repository.set_task_status(&ancestor_id, rollup.status).await?;
                mirror.insert(updated);
            }
        } else if ancestor.role() == TaskRole::Phase {
            let workstreams: Vec<&Task> = mirror
                .children(&ancestor_id)
                .into_iter()
                .filter(|t| t.role() == TaskRole::Workstream)
                .collect();
            let rollups: Vec<Rollup> = workstreams
                .iter()
                .map(|ws| rollup_workstream(&collect_descendants(&mirror, &ws.task_id)))
                .collect();
            let (completion, can_advance) = rollup_phase(&rollups);
            let status = derive_phase_status(completion, can_advance, &rollups);
            if status != ancestor.status {
                let updated = ctx.repository.set_task_status(&ancestor_id, status).await?;
                mirror.insert(updated);
            }
        }

        current_parent = mirror.get(&ancestor_id).and_then(|t| t.parent_task.clone());
    }
    Ok(())
}

fn derive_phase_status(completion: f64, can_advance: bool, rollups: &[Rollup]) -> TaskStatus {
    if rollups.is_empty() {
        return TaskStatus::Pending;
    }
    if can_advance {
        TaskStatus::Completed
    } else if completion > 0.0 || rollups.iter().any(|r| r.status == TaskStatus::InProgress) {
        TaskStatus::InProgress
    } else {
        TaskStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RagConfig;
    use agent_mcp_core::models::TaskMirror;
    use agent_mcp_core::Repository;
    use database::{store::Store, SqliteRepository};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    async fn context() -> HandlerContext {
        let store = Store::connect(None).await.unwrap();
        let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::new(store));
        HandlerContext {
            repository,
            mirror: Arc::new(RwLock::new(TaskMirror::new())),
            embeddings: None,
            rag: RagConfig::default(),
        }
    }

    #[tokio::test]
    async fn create_task_persists_and_updates_mirror() {
        let ctx = context().await;
        let principal = Principal::Admin;
        let result = create_task(
            &ctx,
            &principal,
            json!({ "title": "Design schema", "description": "Lay out the tables" }),
        )
        .await
        .unwrap();

        let task_id = result["task_id"].as_str().unwrap().to_string();
        assert_eq!(result["status"], "pending");
        assert!(ctx.mirror.read().await.get(&task_id).is_some());
    }

    #[tokio::test]
    async fn create_phase_rejects_out_of_order_phase() {
        let ctx = context().await;
        let principal = Principal::Admin;
        let err = create_phase(
            &ctx,
            &principal,
            json!({ "phase_type": "intelligence" }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_phase_then_advance_requires_completed_workstreams() {
        let ctx = context().await;
        let principal = Principal::Admin;
        create_phase(&ctx, &principal, json!({ "phase_type": "foundation" }))
            .await
            .unwrap();

        let err = advance_phase(
            &ctx,
            &principal,
            json!({ "current_phase_id": "phase_1_foundation" }),
        )
        .await;
        // No workstream children at all means rollup_phase sees an empty
        // set, so advancing is not permitted without force.
        assert!(err.is_err());

        let forced = advance_phase(
            &ctx,
            &principal,
            json!({ "current_phase_id": "phase_1_foundation", "force": true }),
        )
        .await
        .unwrap();
        assert_eq!(forced["phase"]["status"], "completed");
    }

    #[tokio::test]
    async fn update_task_status_rejects_invalid_transition() {
        let ctx = context().await;
        let principal = Principal::Admin;
        let task = create_task(
            &ctx,
            &principal,
            json!({ "title": "T", "description": "D" }),
        )
        .await
        .unwrap();
        let task_id = task["task_id"].as_str().unwrap();

        update_task_status(
            &ctx,
            &principal,
            json!({ "task_id": task_id, "new_status": "completed" }),
        )
        .await
        .unwrap();

        let err = update_task_status(
            &ctx,
            &principal,
            json!({ "task_id": task_id, "new_status": "in_progress" }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_task_status_enforces_dependency_not_met() {
        let ctx = context().await;
        let principal = Principal::Admin;
        let blocker = create_task(&ctx, &principal, json!({ "title": "Blocker", "description": "D" }))
            .await
            .unwrap();
        let blocker_id = blocker["task_id"].as_str().unwrap().to_string();

        let dependent = create_task(
            &ctx,
            &principal,
            json!({ "title": "Dependent", "description": "D", "depends_on": [blocker_id] }),
        )
        .await
        .unwrap();
        let dependent_id = dependent["task_id"].as_str().unwrap();

        let err = update_task_status(
            &ctx,
            &principal,
            json!({ "task_id": dependent_id, "new_status": "in_progress" }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::DependencyNotMet(_)));
    }

    #[tokio::test]
    async fn set_context_then_get_context_round_trips() {
        let ctx = context().await;
        let principal = Principal::Admin;
        set_context(
            &ctx,
            &principal,
            json!({ "context_key": "architecture", "value": { "style": "hexagonal" } }),
        )
        .await
        .unwrap();

        let fetched = get_context(&ctx, &principal, json!({ "context_key": "architecture" }))
            .await
            .unwrap();
        assert_eq!(fetched["value"]["style"], "hexagonal");
    }

    #[tokio::test]
    async fn assign_task_refuses_terminated_agent() {
        let ctx = context().await;
        let principal = Principal::Admin;
        ctx.repository.create_agent("agent-1", "hash", "blue").await.unwrap();
        ctx.repository
            .set_agent_status("agent-1", AgentStatus::Terminated)
            .await
            .unwrap();

        let task = create_task(&ctx, &principal, json!({ "title": "T", "description": "D" }))
            .await
            .unwrap();
        let task_id = task["task_id"].as_str().unwrap();

        let err = assign_task(
            &ctx,
            &principal,
            json!({ "agent_id": "agent-1", "task_id": task_id }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::Conflict(_)));
    }
}
