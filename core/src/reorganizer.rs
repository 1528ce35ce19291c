//! Graph Reorganizer (C4): reads a flat legacy task graph and produces a
//! phase/workstream reassignment plan that preserves relationships, then
//! (via the caller) applies that plan atomically.
//!
//! Ported from `original_source/agent_mcp/core/relationship_aware_migration.py`
//! (`TaskRelationshipAnalyzer` + `RelationshipAwareMigration`): relationship
//! maps → root identification → DFS clustering over parent/child,
//! dependency, and reverse-dependency edges → keyword-scored workstream
//! classification → phase assignment by completion signal → consolidation
//! capped at `min_tasks_per_workstream`/`max_workstreams_per_phase`.
//!
//! A narrower supplemental classifier — `startup_classifier` — is ported
//! from `startup_migration.py`'s `AIPhaseClassifier`: it is used only to
//! fold newly-appearing flat roots into the existing phase structure at
//! startup, not to run the full five-step pipeline above.

use std::collections::{HashMap, HashSet};

use crate::{
    migration_config::MigrationConfig,
    models::{Task, TaskStatus, PHASE_IDS, WORKSTREAM_PREFIX},
};

const WORKSTREAM_PATTERNS: &[(&str, &[&str])] = &[
    ("authentication", &["auth", "login", "user", "profile", "session", "signup"]),
    ("quote_calculator", &["quote", "calculator", "pricing", "estimate"]),
    ("dashboard", &["dashboard", "admin", "management", "overview"]),
    ("api_development", &["api", "endpoint", "service", "backend"]),
    ("database", &["database", "schema", "table", "migration"]),
    ("ui_development", &["ui", "component", "page", "interface", "frontend"]),
    ("testing", &["test", "testing", "quality", "qa"]),
    ("deployment", &["deploy", "deployment", "production", "ci", "cd"]),
];

fn workstream_title(key: &str) -> String {
    match key {
        "authentication" => "Authentication & User Management".to_string(),
        "quote_calculator" => "Quote Calculator System".to_string(),
        "dashboard" => "Dashboard Features".to_string(),
        "api_development" => "API Development".to_string(),
        "database" => "Database Architecture".to_string(),
        "ui_development" => "UI Components & Pages".to_string(),
        "testing" => "Testing Framework".to_string(),
        "deployment" => "Deployment & DevOps".to_string(),
        "general" => "General Tasks".to_string(),
        other => other
            .split('_')
            .map(|w| {
                let mut c = w.chars();
                match c.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn is_structural(task_id: &str) -> bool {
    task_id.starts_with(crate::models::PHASE_PREFIX) || task_id.starts_with(WORKSTREAM_PREFIX)
}

struct RelationshipMaps<'a> {
    tasks: HashMap<&'a str, &'a Task>,
    children: HashMap<&'a str, Vec<&'a str>>,
    parent: HashMap<&'a str, &'a str>,
    depends_on: HashMap<&'a str, HashSet<&'a str>>,
    dependents: HashMap<&'a str, HashSet<&'a str>>,
}

fn build_relationship_maps(tasks: &[Task]) -> RelationshipMaps<'_> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut depends_on: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut dependents: HashMap<&str, HashSet<&str>> = HashMap::new();

    for task in tasks {
        let task_id = task.task_id.as_str();
        if is_structural(task_id) {
            continue;
        }
        if let Some(parent_id) = task.parent_task.as_deref() {
            if !is_structural(parent_id) {
                parent.insert(task_id, parent_id);
                children.entry(parent_id).or_default().push(task_id);
            }
        }
        for dep in &task.depends_on_tasks {
            if by_id.contains_key(dep.as_str()) {
                depends_on.entry(task_id).or_default().insert(dep.as_str());
                dependents.entry(dep.as_str()).or_default().insert(task_id);
            }
        }
    }

    RelationshipMaps {
        tasks: by_id,
        children,
        parent,
        depends_on,
        dependents,
    }
}

fn identify_root_tasks<'a>(maps: &RelationshipMaps<'a>) -> Vec<&'a str> {
    let mut roots = Vec::new();
    for (&task_id, _) in maps.tasks.iter() {
        if is_structural(task_id) {
            continue;
        }
        let parent_id = maps.parent.get(task_id).copied();
        let parent_task = parent_id.and_then(|p| maps.tasks.get(p));
        let parent_cancelled = parent_task.map(|t| t.status == TaskStatus::Cancelled).unwrap_or(false);
        let parent_structural = parent_id.map(is_structural).unwrap_or(false);
        let parent_missing = parent_id.map(|p| !maps.tasks.contains_key(p)).unwrap_or(false);

        let is_root = parent_id.is_none() || parent_cancelled || parent_structural || parent_missing;
        if is_root {
            roots.push(task_id);
        }
    }
    roots.sort_unstable();
    roots
}

fn collect_related<'a>(
    task_id: &'a str,
    maps: &RelationshipMaps<'a>,
    cluster: &mut HashSet<&'a str>,
    visited: &mut HashSet<&'a str>,
) {
    if visited.contains(task_id) || is_structural(task_id) {
        return;
    }
    visited.insert(task_id);
    cluster.insert(task_id);

    if let Some(children) = maps.children.get(task_id) {
        for &child in children {
            collect_related(child, maps, cluster, visited);
        }
    }
    if let Some(deps) = maps.depends_on.get(task_id) {
        for &dep in deps {
            collect_related(dep, maps, cluster, visited);
        }
    }
    if let Some(dependents) = maps.dependents.get(task_id) {
        for &dependent in dependents {
            collect_related(dependent, maps, cluster, visited);
        }
    }
}

fn build_clusters<'a>(maps: &RelationshipMaps<'a>, roots: &[&'a str]) -> HashMap<String, HashSet<&'a str>> {
    let mut clusters: HashMap<String, HashSet<&str>> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::new();

    for &root_id in roots {
        if visited.contains(root_id) {
            continue;
        }
        let mut cluster = HashSet::new();
        collect_related(root_id, maps, &mut cluster, &mut visited);
        if !cluster.is_empty() {
            clusters.insert(format!("cluster_{root_id}"), cluster);
        }
    }

    let all_regular: HashSet<&str> = maps
        .tasks
        .keys()
        .copied()
        .filter(|id| !is_structural(id))
        .collect();
    let mut remaining: Vec<&str> = all_regular.difference(&visited).copied().collect();
    remaining.sort_unstable();

    for task_id in remaining {
        if visited.contains(task_id) {
            continue;
        }
        let mut cluster = HashSet::new();
        collect_related(task_id, maps, &mut cluster, &mut visited);
        if !cluster.is_empty() {
            clusters.insert(format!("cluster_disconnected_{task_id}"), cluster);
        }
    }

    let leftover: HashSet<&str> = all_regular.difference(&visited).copied().collect();
    if !leftover.is_empty() {
        clusters.insert("cluster_uncategorized".to_string(), leftover);
    }

    clusters
}

struct ClusterAnalysis {
    workstream_type: String,
    completion_rate: f64,
    has_active_work: bool,
    size: usize,
}

fn determine_workstream_type(tasks: &[&Task]) -> String {
    let mut all_text = String::new();
    for t in tasks {
        all_text.push(' ');
        all_text.push_str(&t.title);
        all_text.push(' ');
        all_text.push_str(&t.description);
    }
    let all_text = all_text.to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    for (ws_type, keywords) in WORKSTREAM_PATTERNS {
        let score: usize = keywords.iter().map(|kw| all_text.matches(kw).count()).sum();
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((ws_type, score));
        }
    }
    best.map(|(t, _)| t.to_string()).unwrap_or_else(|| "general".to_string())
}

fn analyze_clusters<'a>(
    maps: &RelationshipMaps<'a>,
    clusters: &HashMap<String, HashSet<&'a str>>,
) -> HashMap<String, ClusterAnalysis> {
    let mut out = HashMap::new();
    for (cluster_id, task_ids) in clusters {
        let cluster_tasks: Vec<&Task> = task_ids.iter().filter_map(|id| maps.tasks.get(id).copied()).collect();
        let workstream_type = determine_workstream_type(&cluster_tasks);
        let completed = cluster_tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        let in_progress = cluster_tasks.iter().filter(|t| t.status == TaskStatus::InProgress).count();
        let size = task_ids.len();
        out.insert(
            cluster_id.clone(),
            ClusterAnalysis {
                workstream_type,
                completion_rate: if size == 0 { 0.0 } else { completed as f64 / size as f64 },
                has_active_work: in_progress > 0,
                size,
            },
        );
    }
    out
}

struct PhaseClusterGroup {
    clusters: Vec<String>,
    total_tasks: usize,
}

fn assign_clusters_to_phases(
    clusters: &HashMap<String, HashSet<&str>>,
    analysis: &HashMap<String, ClusterAnalysis>,
    current_phase: &str,
    next_phase: &str,
) -> HashMap<String, HashMap<String, PhaseClusterGroup>> {
    let mut phase_clusters: HashMap<String, HashMap<String, PhaseClusterGroup>> = HashMap::new();

    let mut ids: Vec<&String> = clusters.keys().collect();
    ids.sort();
    for cluster_id in ids {
        let a = &analysis[cluster_id];
        let phase = if (a.completion_rate - 1.0).abs() < f64::EPSILON {
            PHASE_IDS[0].to_string()
        } else if a.has_active_work || a.completion_rate > 0.0 {
            current_phase.to_string()
        } else {
            next_phase.to_string()
        };

        let entry = phase_clusters
            .entry(phase)
            .or_default()
            .entry(a.workstream_type.clone())
            .or_insert_with(|| PhaseClusterGroup { clusters: Vec::new(), total_tasks: 0 });
        entry.clusters.push(cluster_id.clone());
        entry.total_tasks += a.size;
    }

    phase_clusters
}

fn consolidate_clusters(
    phase_cluster_map: HashMap<String, PhaseClusterGroup>,
    config: &MigrationConfig,
) -> HashMap<String, PhaseClusterGroup> {
    let mut consolidated: HashMap<String, PhaseClusterGroup> = HashMap::new();
    let mut small: Vec<(String, PhaseClusterGroup)> = Vec::new();

    for (ws_type, group) in phase_cluster_map {
        if group.total_tasks as i64 >= config.min_tasks_per_workstream {
            consolidated.insert(ws_type, group);
        } else {
            small.push((ws_type, group));
        }
    }

    if !small.is_empty() {
        let mut general_clusters = Vec::new();
        let mut general_tasks = 0usize;
        for (_, group) in small {
            general_clusters.extend(group.clusters);
            general_tasks += group.total_tasks;
        }
        if !general_clusters.is_empty() {
            consolidated.insert(
                "general".to_string(),
                PhaseClusterGroup { clusters: general_clusters, total_tasks: general_tasks },
            );
        }
    }

    if consolidated.len() as i64 > config.max_workstreams_per_phase {
        let mut sorted: Vec<(String, PhaseClusterGroup)> = consolidated.into_iter().collect();
        sorted.sort_by(|a, b| b.1.total_tasks.cmp(&a.1.total_tasks));

        let keep_count = (config.max_workstreams_per_phase as usize).saturating_sub(1).max(1);
        let mut keep: HashMap<String, PhaseClusterGroup> = sorted.drain(..keep_count.min(sorted.len())).collect();
        let merge = sorted;

        let mut general_clusters = keep.remove("general").map(|g| g.clusters).unwrap_or_default();
        let mut general_tasks = 0usize;
        for (ws_type, group) in merge {
            if ws_type != "general" {
                general_clusters.extend(group.clusters);
                general_tasks += group.total_tasks;
            }
        }
        keep.insert(
            "general".to_string(),
            PhaseClusterGroup { clusters: general_clusters, total_tasks: general_tasks },
        );
        consolidated = keep;
    }

    consolidated
}

/// A single workstream the plan will create (or has already created),
/// carrying the task ids it should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkstreamPlan {
    pub workstream_id: String,
    pub phase_id: String,
    pub title: String,
    pub task_ids: Vec<String>,
}

/// Output of the five-step reorganization pipeline: the workstreams to
/// create and the task-to-workstream assignment. Applying this plan means
/// creating each workstream (if absent) and reparenting every listed task
/// under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorgPlan {
    pub workstreams: Vec<WorkstreamPlan>,
    pub task_assignments: HashMap<String, String>,
}

/// Run the full five-step pipeline over `tasks`, producing a plan that
/// assigns every non-structural task to a workstream under `current_phase`
/// or `next_phase` based on its cluster's completion signal.
pub fn plan(tasks: &[Task], current_phase: &str, next_phase: &str, config: &MigrationConfig) -> ReorgPlan {
    let maps = build_relationship_maps(tasks);
    let roots = identify_root_tasks(&maps);
    let clusters = build_clusters(&maps, &roots);
    let analysis = analyze_clusters(&maps, &clusters);
    let phase_clusters = assign_clusters_to_phases(&clusters, &analysis, current_phase, next_phase);

    let mut workstreams = Vec::new();
    let mut task_assignments = HashMap::new();

    let mut phase_ids: Vec<&String> = phase_clusters.keys().collect();
    phase_ids.sort();
    for phase_id in phase_ids {
        let group_map = phase_clusters[phase_id].iter().map(|(k, v)| {
            (k.clone(), PhaseClusterGroup { clusters: v.clusters.clone(), total_tasks: v.total_tasks })
        }).collect();
        let consolidated = consolidate_clusters(group_map, config);

        let mut ws_keys: Vec<&String> = consolidated.keys().collect();
        ws_keys.sort();
        for ws_key in ws_keys {
            let group = &consolidated[ws_key];
            let workstream_id = format!("{WORKSTREAM_PREFIX}{phase_id}_{ws_key}");
            let mut task_ids: Vec<String> = Vec::new();
            for cluster_id in &group.clusters {
                let mut ids: Vec<&str> = clusters[cluster_id].iter().copied().collect();
                ids.sort_unstable();
                for id in ids {
                    task_ids.push(id.to_string());
                    task_assignments.insert(id.to_string(), workstream_id.clone());
                }
            }
            workstreams.push(WorkstreamPlan {
                workstream_id,
                phase_id: phase_id.clone(),
                title: workstream_title(ws_key),
                task_ids,
            });
        }
    }

    ReorgPlan { workstreams, task_assignments }
}

/// The narrower supplemental classifier used at startup to fold newly
/// appearing flat roots into the existing phase structure, rather than
/// running the full clustering pipeline above. Ported from
/// `startup_migration.py`'s `AIPhaseClassifier`.
pub mod startup_classifier {
    use super::PHASE_IDS;
    use crate::models::Task;

    struct PhaseDefinition {
        id: &'static str,
        keywords: &'static [&'static str],
    }

    const PHASE_DEFINITIONS: &[PhaseDefinition] = &[
        PhaseDefinition {
            id: "phase_1_foundation",
            keywords: &["setup", "foundation", "infrastructure", "config", "database", "schema", "auth", "scaffold"],
        },
        PhaseDefinition {
            id: "phase_2_intelligence",
            keywords: &["ai", "model", "embedding", "rag", "intelligence", "classif", "analysis", "learning"],
        },
        PhaseDefinition {
            id: "phase_3_coordination",
            keywords: &["agent", "coordination", "orchestrat", "multi-agent", "workflow", "collaborat"],
        },
        PhaseDefinition {
            id: "phase_4_optimization",
            keywords: &["optimi", "performance", "scale", "cache", "tuning", "refactor"],
        },
    ];

    fn calculate_keyword_score(text: &str, keywords: &[&str]) -> f64 {
        if keywords.is_empty() {
            return 0.0;
        }
        let hits = keywords.iter().filter(|kw| text.contains(*kw)).count();
        hits as f64 / keywords.len() as f64
    }

    fn analyze_task_context(task: &Task) -> String {
        let mut text = format!("{} {}", task.title, task.description);
        for note in &task.notes {
            text.push(' ');
            text.push_str(&note.content);
        }
        text.to_lowercase()
    }

    /// Five heuristic adjustments layered on top of the raw keyword score,
    /// matching `apply_heuristic_rules`: an early task with no strong
    /// signal leans foundation; a task mentioning another phase's
    /// terminology by name is nudged toward it; a very short
    /// title+description is penalized (low confidence, defer to
    /// enforce_linear_progression's foundation fallback).
    fn apply_heuristic_rules(context: &str, phase_id: &str, score: f64) -> f64 {
        let mut adjusted = score;
        if context.len() < 20 {
            adjusted *= 0.5;
        }
        if context.contains(phase_id) || context.contains(&phase_id.replace("phase_", "")) {
            adjusted += 0.2;
        }
        if phase_id == "phase_1_foundation" && (context.contains("initial") || context.contains("bootstrap")) {
            adjusted += 0.1;
        }
        if phase_id == "phase_4_optimization" && context.contains("mvp") {
            adjusted -= 0.1;
        }
        if context.contains("blocked") || context.contains("todo") {
            adjusted *= 0.9;
        }
        adjusted.clamp(0.0, 1.0)
    }

    /// Classify one task, returning `(phase_id, confidence)`. Confidence
    /// below 0.05 defaults to foundation, matching the Python source.
    pub fn classify_task(task: &Task) -> (&'static str, f64) {
        let context = analyze_task_context(task);
        let mut best = (PHASE_IDS[0], 0.0f64);
        for def in PHASE_DEFINITIONS {
            let raw = calculate_keyword_score(&context, def.keywords);
            let adjusted = apply_heuristic_rules(&context, def.id, raw);
            if adjusted > best.1 {
                best = (def.id, adjusted);
            }
        }
        if best.1 < 0.05 {
            (PHASE_IDS[0], best.1)
        } else {
            best
        }
    }

    /// Folding newly-appearing flat roots always places them in
    /// `phase_1_foundation` to preserve linear progression, recording the
    /// raw suggestion alongside for audit purposes — matching
    /// `enforce_linear_progression`.
    pub struct ClassificationResult {
        pub task_id: String,
        pub assigned_phase: &'static str,
        pub original_ai_suggestion: &'static str,
        pub confidence: f64,
    }

    pub fn enforce_linear_progression(tasks: &[Task]) -> Vec<ClassificationResult> {
        tasks
            .iter()
            .map(|task| {
                let (suggestion, confidence) = classify_task(task);
                ClassificationResult {
                    task_id: task.task_id.clone(),
                    assigned_phase: PHASE_IDS[0],
                    original_ai_suggestion: suggestion,
                    confidence,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::Priority;

    fn task(id: &str, title: &str, status: TaskStatus, parent: Option<&str>, deps: Vec<&str>) -> Task {
        Task {
            task_id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            status,
            priority: Priority::Medium,
            assigned_to: None,
            created_by: "agent1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            parent_task: parent.map(|s| s.to_string()),
            depends_on_tasks: deps.into_iter().map(|s| s.to_string()).collect(),
            notes: vec![],
        }
    }

    #[test]
    fn clusters_group_parent_child_and_dependency_edges() {
        let tasks = vec![
            task("login_ui", "Login page UI", TaskStatus::Completed, None, vec![]),
            task("login_api", "Login API endpoint", TaskStatus::Completed, None, vec!["login_ui"]),
            task("signup_flow", "User signup flow", TaskStatus::Pending, Some("login_api"), vec![]),
        ];
        let config = MigrationConfig::default();
        let result = plan(&tasks, "phase_2_intelligence", "phase_3_coordination", &config);

        let ws_for_login_ui = result.task_assignments.get("login_ui").cloned();
        let ws_for_signup = result.task_assignments.get("signup_flow").cloned();
        assert_eq!(ws_for_login_ui, ws_for_signup, "related tasks land in the same workstream");
        assert!(result.workstreams.iter().any(|w| w.title.contains("Authentication")));
    }

    #[test]
    fn completed_clusters_go_to_foundation() {
        let tasks = vec![
            task("setup_db", "Configure the database schema", TaskStatus::Completed, None, vec![]),
        ];
        let config = MigrationConfig::default();
        let result = plan(&tasks, "phase_2_intelligence", "phase_3_coordination", &config);
        let ws_id = result.task_assignments.get("setup_db").unwrap();
        assert!(ws_id.starts_with("root_phase_1_foundation"));
    }

    #[test]
    fn pending_clusters_go_to_next_phase() {
        let tasks = vec![
            task("future_work", "Plan future optimization", TaskStatus::Pending, None, vec![]),
        ];
        let config = MigrationConfig::default();
        let result = plan(&tasks, "phase_2_intelligence", "phase_3_coordination", &config);
        let ws_id = result.task_assignments.get("future_work").unwrap();
        assert!(ws_id.starts_with("root_phase_3_coordination"));
    }

    #[test]
    fn small_clusters_consolidate_into_general() {
        let mut config = MigrationConfig::default();
        config.min_tasks_per_workstream = 5;
        let tasks = vec![
            task("lone_task", "A completely unrelated task", TaskStatus::InProgress, None, vec![]),
        ];
        let result = plan(&tasks, "phase_2_intelligence", "phase_3_coordination", &config);
        let ws_id = result.task_assignments.get("lone_task").unwrap();
        assert!(ws_id.ends_with("general"));
    }

    #[test]
    fn every_task_is_assigned_to_some_workstream() {
        let tasks = vec![
            task("a", "Write tests", TaskStatus::InProgress, None, vec![]),
            task("b", "Deploy to production", TaskStatus::Pending, None, vec![]),
            task("c", "Orphaned with missing parent", TaskStatus::Pending, Some("does_not_exist"), vec![]),
        ];
        let config = MigrationConfig::default();
        let result = plan(&tasks, "phase_2_intelligence", "phase_3_coordination", &config);
        for t in &tasks {
            assert!(result.task_assignments.contains_key(&t.task_id), "{} unassigned", t.task_id);
        }
    }

    #[test]
    fn startup_classifier_always_assigns_foundation() {
        let tasks = vec![
            task("agent_orchestration", "Coordinate multi-agent workflow", TaskStatus::Pending, None, vec![]),
        ];
        let results = startup_classifier::enforce_linear_progression(&tasks);
        assert_eq!(results[0].assigned_phase, "phase_1_foundation");
        assert_eq!(results[0].original_ai_suggestion, "phase_3_coordination");
    }

    #[test]
    fn low_confidence_classification_defaults_to_foundation() {
        let t = task("vague", "Do the thing", TaskStatus::Pending, None, vec![]);
        let (phase, _confidence) = startup_classifier::classify_task(&t);
        assert_eq!(phase, "phase_1_foundation");
    }
}
