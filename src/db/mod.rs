mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

/// A parent record named by an operation does not exist.
#[derive(Debug, Error)]
#[error("{0} not found")]
pub struct NotFound(pub &'static str);

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const PROJECT_COLUMNS: &str = "id, name, status, created_at, updated_at";
const BACKLOG_COLUMNS: &str = "id, project_id, name, created_at";
const SPRINT_COLUMNS: &str = "id, product_backlog_id, name, status, created_at, updated_at";
const PBI_COLUMNS: &str = "id, product_backlog_id, sprint_backlog_id, name, description, \
     point_estimate, status, priority, created_at, updated_at";
const TASK_COLUMNS: &str = "id, pbi_id, name, description, estimated_effort_hours, \
     actual_effort_hours, status, created_at, updated_at";

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    /// `backtrack.db` in the platform data directory.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "backtrack")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("backtrack.db"))
    }

    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Cascading deletes rely on this; SQLite leaves it off per connection.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let projects = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects WHERE status = ? ORDER BY name, rowid"
                ))?;
                let rows = stmt.query_map([status.as_str()], project_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name, rowid"
                ))?;
                let rows = stmt.query_map([], project_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(fetch_project(&conn, id)?)
    }

    /// Create a project together with its product backlog and the backlog's
    /// first sprint.
    ///
    /// The three inserts share one transaction: either the whole hierarchy
    /// exists afterwards or none of it does.
    pub fn create_project(&self, input: CreateProjectInput) -> Result<ProjectHierarchy> {
        input.validate()?;

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now();

        let project = Project {
            id: Uuid::new_v4(),
            name: input.name,
            status: input.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        tx.execute(
            "INSERT INTO projects (id, name, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                project.id.to_string(),
                &project.name,
                project.status.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        let product_backlog = ProductBacklog {
            id: Uuid::new_v4(),
            project_id: project.id,
            name: ProductBacklog::default_name(&project.name),
            created_at: now,
        };
        tx.execute(
            "INSERT INTO product_backlogs (id, project_id, name, created_at)
             VALUES (?, ?, ?, ?)",
            (
                product_backlog.id.to_string(),
                project.id.to_string(),
                &product_backlog.name,
                now.to_rfc3339(),
            ),
        )?;

        let sprint_backlog = insert_sprint(
            &tx,
            product_backlog.id,
            product_backlog.default_sprint_name(),
            SprintStatus::NotYetStarted,
            now,
        )?;

        tx.commit()?;

        tracing::info!(
            project_id = %project.id,
            product_backlog_id = %product_backlog.id,
            sprint_backlog_id = %sprint_backlog.id,
            "Created project {:?}",
            project.name
        );

        Ok(ProjectHierarchy {
            project,
            product_backlog,
            sprint_backlog,
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Option<Project>> {
        input.validate()?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(existing) = fetch_project(&conn, id)? else {
            return Ok(None);
        };

        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let status = input.status.unwrap_or(existing.status);

        conn.execute(
            "UPDATE projects SET name = ?, status = ?, updated_at = ? WHERE id = ?",
            (&name, status.as_str(), now.to_rfc3339(), id.to_string()),
        )?;

        Ok(Some(Project {
            id,
            name,
            status,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    /// Delete a project. Its backlog, sprints, PBIs and tasks go with it.
    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
        if rows > 0 {
            tracing::info!(project_id = %id, "Deleted project");
        }
        Ok(rows > 0)
    }

    pub fn get_project_detail(&self, id: Uuid) -> Result<Option<ProjectDetail>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(project) = fetch_project(&conn, id)? else {
            return Ok(None);
        };
        let product_backlog = fetch_backlog_for_project(&conn, id)?
            .ok_or_else(|| anyhow::anyhow!("Project {} has no product backlog", id))?;

        let pbis = query_pbis(
            &conn,
            "WHERE product_backlog_id = ? ORDER BY priority, rowid",
            product_backlog.id,
        )?;

        let sprints = query_sprints(
            &conn,
            "WHERE product_backlog_id = ? ORDER BY rowid",
            product_backlog.id,
        )?
        .into_iter()
        .map(|sprint| load_sprint_pbis(&conn, sprint).map(|s| s.summary()))
        .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(ProjectDetail {
            project,
            product_backlog,
            pbis,
            sprints,
        }))
    }

    /// Sprints of the project's backlog whose status is `Complete`, in the
    /// order they were created, each loaded with its PBIs and tasks.
    pub fn get_completed_sprints(&self, project_id: Uuid) -> Result<Vec<SprintWithPbis>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(fetch_completed_sprints(&conn, project_id)?)
    }

    /// Velocity chart of a project, or `None` if the project does not exist.
    pub fn get_velocity_chart(&self, project_id: Uuid) -> Result<Option<VelocityChart>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        if fetch_project(&conn, project_id)?.is_none() {
            return Ok(None);
        }
        let sprints = fetch_completed_sprints(&conn, project_id)?;
        Ok(Some(VelocityChart::from_sprints(&sprints)))
    }

    // ============================================================
    // Product Backlog operations
    // ============================================================

    pub fn get_product_backlog(&self, id: Uuid) -> Result<Option<ProductBacklog>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let backlog = conn
            .query_row(
                &format!("SELECT {BACKLOG_COLUMNS} FROM product_backlogs WHERE id = ?"),
                [id.to_string()],
                backlog_from_row,
            )
            .optional()?;
        Ok(backlog)
    }

    pub fn get_project_backlog(&self, project_id: Uuid) -> Result<Option<ProductBacklog>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(fetch_backlog_for_project(&conn, project_id)?)
    }

    /// Every PBI in the backlog, highest priority first, ties in creation order.
    pub fn get_backlog_pbis(&self, product_backlog_id: Uuid) -> Result<Vec<ProductBacklogItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(query_pbis(
            &conn,
            "WHERE product_backlog_id = ? ORDER BY priority, rowid",
            product_backlog_id,
        )?)
    }

    // ============================================================
    // Sprint Backlog operations
    // ============================================================

    pub fn get_sprint_backlog(&self, id: Uuid) -> Result<Option<SprintBacklog>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(fetch_sprint(&conn, id)?)
    }

    pub fn get_sprints_by_backlog(&self, product_backlog_id: Uuid) -> Result<Vec<SprintBacklog>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(query_sprints(
            &conn,
            "WHERE product_backlog_id = ? ORDER BY rowid",
            product_backlog_id,
        )?)
    }

    pub fn create_sprint_backlog(
        &self,
        product_backlog_id: Uuid,
        input: CreateSprintInput,
    ) -> Result<SprintBacklog> {
        input.validate()?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let backlog_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM product_backlogs WHERE id = ?)",
            [product_backlog_id.to_string()],
            |row| row.get(0),
        )?;
        if !backlog_exists {
            return Err(NotFound("Product backlog").into());
        }

        let sprint = insert_sprint(
            &conn,
            product_backlog_id,
            input.name,
            input.status.unwrap_or_default(),
            Utc::now(),
        )?;
        tracing::info!(sprint_backlog_id = %sprint.id, "Created sprint {:?}", sprint.name);
        Ok(sprint)
    }

    pub fn update_sprint_backlog(
        &self,
        id: Uuid,
        input: UpdateSprintInput,
    ) -> Result<Option<SprintBacklog>> {
        input.validate()?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(existing) = fetch_sprint(&conn, id)? else {
            return Ok(None);
        };

        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let status = input.status.unwrap_or(existing.status);

        conn.execute(
            "UPDATE sprint_backlogs SET name = ?, status = ?, updated_at = ? WHERE id = ?",
            (&name, status.as_str(), now.to_rfc3339(), id.to_string()),
        )?;

        Ok(Some(SprintBacklog {
            id,
            product_backlog_id: existing.product_backlog_id,
            name,
            status,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    /// Load a sprint with its PBIs and their tasks for aggregation.
    pub fn get_sprint_with_pbis(&self, id: Uuid) -> Result<Option<SprintWithPbis>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(sprint) = fetch_sprint(&conn, id)? else {
            return Ok(None);
        };
        Ok(Some(load_sprint_pbis(&conn, sprint)?))
    }

    /// Owning project of a sprint, used to check path consistency.
    pub fn get_sprint_project_id(&self, id: Uuid) -> Result<Option<Uuid>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project_id = conn
            .query_row(
                "SELECT b.project_id FROM sprint_backlogs s
                 JOIN product_backlogs b ON b.id = s.product_backlog_id
                 WHERE s.id = ?",
                [id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(project_id.map(parse_uuid))
    }

    // ============================================================
    // Product Backlog Item operations
    // ============================================================

    pub fn get_pbi(&self, id: Uuid) -> Result<Option<ProductBacklogItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(fetch_pbi(&conn, id)?)
    }

    /// PBIs assigned to a sprint, highest priority first, ties in creation order.
    pub fn get_pbis_by_sprint(&self, sprint_backlog_id: Uuid) -> Result<Vec<ProductBacklogItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(query_pbis(
            &conn,
            "WHERE sprint_backlog_id = ? ORDER BY priority, rowid",
            sprint_backlog_id,
        )?)
    }

    pub fn create_pbi(
        &self,
        product_backlog_id: Uuid,
        input: CreatePbiInput,
    ) -> Result<ProductBacklogItem> {
        input.validate()?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let backlog_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM product_backlogs WHERE id = ?)",
            [product_backlog_id.to_string()],
            |row| row.get(0),
        )?;
        if !backlog_exists {
            return Err(NotFound("Product backlog").into());
        }
        if let Some(sprint_id) = input.sprint_backlog_id {
            check_sprint_in_backlog(&conn, sprint_id, product_backlog_id)?;
        }

        let now = Utc::now();
        let pbi = ProductBacklogItem {
            id: Uuid::new_v4(),
            product_backlog_id,
            sprint_backlog_id: input.sprint_backlog_id,
            name: input.name,
            description: input.description,
            point_estimate: input.point_estimate,
            status: input.status.unwrap_or_default(),
            priority: input.priority.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO pbis (id, product_backlog_id, sprint_backlog_id, name, description,
                               point_estimate, status, priority, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                pbi.id.to_string(),
                product_backlog_id.to_string(),
                pbi.sprint_backlog_id.map(|u| u.to_string()),
                &pbi.name,
                &pbi.description,
                pbi.point_estimate.points(),
                pbi.status.as_str(),
                pbi.priority.value(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        tracing::debug!(pbi_id = %pbi.id, "Created PBI {:?}", pbi.name);
        Ok(pbi)
    }

    pub fn update_pbi(&self, id: Uuid, input: UpdatePbiInput) -> Result<Option<ProductBacklogItem>> {
        input.validate()?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(existing) = fetch_pbi(&conn, id)? else {
            return Ok(None);
        };

        let sprint_backlog_id = match input.sprint_backlog_id {
            Some(Some(sprint_id)) => {
                check_sprint_in_backlog(&conn, sprint_id, existing.product_backlog_id)?;
                Some(sprint_id)
            }
            Some(None) => None,
            None => existing.sprint_backlog_id,
        };

        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let description = input.description.unwrap_or(existing.description);
        let point_estimate = input.point_estimate.unwrap_or(existing.point_estimate);
        let status = input.status.unwrap_or(existing.status);
        let priority = input.priority.unwrap_or(existing.priority);

        conn.execute(
            "UPDATE pbis SET sprint_backlog_id = ?, name = ?, description = ?, point_estimate = ?,
                             status = ?, priority = ?, updated_at = ?
             WHERE id = ?",
            (
                sprint_backlog_id.map(|u| u.to_string()),
                &name,
                &description,
                point_estimate.points(),
                status.as_str(),
                priority.value(),
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        Ok(Some(ProductBacklogItem {
            id,
            product_backlog_id: existing.product_backlog_id,
            sprint_backlog_id,
            name,
            description,
            point_estimate,
            status,
            priority,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    /// Delete a PBI and its tasks.
    pub fn delete_pbi(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM pbis WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    /// Load a PBI with its tasks for aggregation.
    pub fn get_pbi_with_tasks(&self, id: Uuid) -> Result<Option<PbiWithTasks>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(pbi) = fetch_pbi(&conn, id)? else {
            return Ok(None);
        };
        let tasks = query_tasks_by_pbi(&conn, id)?;
        Ok(Some(PbiWithTasks { pbi, tasks }))
    }

    /// Owning project of a PBI, used to check path consistency.
    pub fn get_pbi_project_id(&self, id: Uuid) -> Result<Option<Uuid>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project_id = conn
            .query_row(
                "SELECT b.project_id FROM pbis p
                 JOIN product_backlogs b ON b.id = p.product_backlog_id
                 WHERE p.id = ?",
                [id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(project_id.map(parse_uuid))
    }

    // ============================================================
    // Task operations
    // ============================================================

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(fetch_task(&conn, id)?)
    }

    pub fn get_tasks_by_pbi(&self, pbi_id: Uuid) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(query_tasks_by_pbi(&conn, pbi_id)?)
    }

    pub fn create_task(&self, pbi_id: Uuid, input: CreateTaskInput) -> Result<Task> {
        let effort = input.validate()?;

        let conn = self.conn.lock().expect("database lock poisoned");
        if fetch_pbi(&conn, pbi_id)?.is_none() {
            return Err(NotFound("PBI").into());
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            pbi_id,
            name: input.name,
            description: input.description,
            estimated_effort_hours: Some(effort.estimated),
            actual_effort_hours: effort.actual,
            status: input.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO tasks (id, pbi_id, name, description, estimated_effort_hours,
                                actual_effort_hours, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                task.id.to_string(),
                pbi_id.to_string(),
                &task.name,
                &task.description,
                task.estimated_effort_hours.map(EffortHours::hours),
                task.actual_effort_hours.map(EffortHours::hours),
                task.status.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        tracing::debug!(task_id = %task.id, pbi_id = %pbi_id, "Created task {:?}", task.name);
        Ok(task)
    }

    pub fn update_task(&self, id: Uuid, input: UpdateTaskInput) -> Result<Option<Task>> {
        let effort = input.validate()?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(existing) = fetch_task(&conn, id)? else {
            return Ok(None);
        };

        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let description = input.description.unwrap_or(existing.description);
        let estimated = effort.estimated.or(existing.estimated_effort_hours);
        let actual = effort.actual.unwrap_or(existing.actual_effort_hours);
        let status = input.status.unwrap_or(existing.status);

        conn.execute(
            "UPDATE tasks SET name = ?, description = ?, estimated_effort_hours = ?,
                              actual_effort_hours = ?, status = ?, updated_at = ?
             WHERE id = ?",
            (
                &name,
                &description,
                estimated.map(EffortHours::hours),
                actual.map(EffortHours::hours),
                status.as_str(),
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        Ok(Some(Task {
            id,
            pbi_id: existing.pbi_id,
            name,
            description,
            estimated_effort_hours: estimated,
            actual_effort_hours: actual,
            status,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    pub fn delete_task(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM tasks WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

// ============================================================
// Queries shared by the operations above. They take the
// connection so composite reads happen under a single lock.
// ============================================================

fn fetch_project(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Project>> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
        [id.to_string()],
        project_from_row,
    )
    .optional()
}

fn fetch_backlog_for_project(
    conn: &Connection,
    project_id: Uuid,
) -> rusqlite::Result<Option<ProductBacklog>> {
    conn.query_row(
        &format!("SELECT {BACKLOG_COLUMNS} FROM product_backlogs WHERE project_id = ?"),
        [project_id.to_string()],
        backlog_from_row,
    )
    .optional()
}

fn fetch_sprint(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<SprintBacklog>> {
    conn.query_row(
        &format!("SELECT {SPRINT_COLUMNS} FROM sprint_backlogs WHERE id = ?"),
        [id.to_string()],
        sprint_from_row,
    )
    .optional()
}

fn query_sprints(
    conn: &Connection,
    clause: &str,
    param: Uuid,
) -> rusqlite::Result<Vec<SprintBacklog>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SPRINT_COLUMNS} FROM sprint_backlogs {clause}"
    ))?;
    let sprints = stmt.query_map([param.to_string()], sprint_from_row)?;
    sprints.collect()
}

fn fetch_completed_sprints(
    conn: &Connection,
    project_id: Uuid,
) -> rusqlite::Result<Vec<SprintWithPbis>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.product_backlog_id, s.name, s.status, s.created_at, s.updated_at
         FROM sprint_backlogs s
         JOIN product_backlogs b ON b.id = s.product_backlog_id
         WHERE b.project_id = ? AND s.status = ?
         ORDER BY s.rowid",
    )?;
    let sprints = stmt
        .query_map(
            (project_id.to_string(), SprintStatus::Complete.as_str()),
            sprint_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    sprints
        .into_iter()
        .map(|sprint| load_sprint_pbis(conn, sprint))
        .collect()
}

fn insert_sprint(
    conn: &Connection,
    product_backlog_id: Uuid,
    name: String,
    status: SprintStatus,
    now: DateTime<Utc>,
) -> rusqlite::Result<SprintBacklog> {
    let sprint = SprintBacklog {
        id: Uuid::new_v4(),
        product_backlog_id,
        name,
        status,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO sprint_backlogs (id, product_backlog_id, name, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        (
            sprint.id.to_string(),
            product_backlog_id.to_string(),
            &sprint.name,
            status.as_str(),
            now.to_rfc3339(),
            now.to_rfc3339(),
        ),
    )?;
    Ok(sprint)
}

fn load_sprint_pbis(conn: &Connection, sprint: SprintBacklog) -> rusqlite::Result<SprintWithPbis> {
    let pbis = query_pbis(
        conn,
        "WHERE sprint_backlog_id = ? ORDER BY priority, rowid",
        sprint.id,
    )?
    .into_iter()
    .map(|pbi| {
        let tasks = query_tasks_by_pbi(conn, pbi.id)?;
        Ok(PbiWithTasks { pbi, tasks })
    })
    .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(SprintWithPbis { sprint, pbis })
}

/// Reject a sprint that does not exist or belongs to another backlog.
fn check_sprint_in_backlog(conn: &Connection, sprint_id: Uuid, product_backlog_id: Uuid) -> Result<()> {
    match fetch_sprint(conn, sprint_id)? {
        Some(sprint) if sprint.product_backlog_id == product_backlog_id => Ok(()),
        _ => Err(ValidationErrors::single(
            "sprint_backlog_id",
            "Select a sprint from the same product backlog.",
        )
        .into()),
    }
}

fn fetch_pbi(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<ProductBacklogItem>> {
    conn.query_row(
        &format!("SELECT {PBI_COLUMNS} FROM pbis WHERE id = ?"),
        [id.to_string()],
        pbi_from_row,
    )
    .optional()
}

fn query_pbis(
    conn: &Connection,
    clause: &str,
    param: Uuid,
) -> rusqlite::Result<Vec<ProductBacklogItem>> {
    let mut stmt = conn.prepare(&format!("SELECT {PBI_COLUMNS} FROM pbis {clause}"))?;
    let pbis = stmt.query_map([param.to_string()], pbi_from_row)?;
    pbis.collect()
}

fn fetch_task(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"),
        [id.to_string()],
        task_from_row,
    )
    .optional()
}

fn query_tasks_by_pbi(conn: &Connection, pbi_id: Uuid) -> rusqlite::Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE pbi_id = ? ORDER BY rowid"
    ))?;
    let tasks = stmt.query_map([pbi_id.to_string()], task_from_row)?;
    tasks.collect()
}

// ============================================================
// Row mapping
// ============================================================

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        status: ProjectStatus::from_str(&row.get::<_, String>(2)?).unwrap_or_default(),
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn backlog_from_row(row: &Row) -> rusqlite::Result<ProductBacklog> {
    Ok(ProductBacklog {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

fn sprint_from_row(row: &Row) -> rusqlite::Result<SprintBacklog> {
    Ok(SprintBacklog {
        id: parse_uuid(row.get::<_, String>(0)?),
        product_backlog_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        status: SprintStatus::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
        created_at: parse_datetime(row.get::<_, String>(4)?),
        updated_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn pbi_from_row(row: &Row) -> rusqlite::Result<ProductBacklogItem> {
    let points: u32 = row.get(5)?;
    let priority: u8 = row.get(7)?;
    Ok(ProductBacklogItem {
        id: parse_uuid(row.get::<_, String>(0)?),
        product_backlog_id: parse_uuid(row.get::<_, String>(1)?),
        sprint_backlog_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
        name: row.get(3)?,
        description: row.get(4)?,
        point_estimate: PointEstimate::try_from(points)
            .map_err(|e| conversion_error(5, Type::Integer, e))?,
        status: PbiStatus::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        priority: Priority::try_from(priority).map_err(|e| conversion_error(7, Type::Integer, e))?,
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let id = parse_uuid(row.get::<_, String>(0)?);
    Ok(Task {
        id,
        pbi_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        estimated_effort_hours: effort_column(row, 4, id)?,
        actual_effort_hours: effort_column(row, 5, id)?,
        status: TaskStatus::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        created_at: parse_datetime(row.get::<_, String>(7)?),
        updated_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

/// Read an effort column leniently.
///
/// SQLite does not enforce column types, so rows written by other tools may
/// hold text, negative numbers or values above `EffortHours::MAX_HOURS` here.
/// Those read as `None` (and so count as zero in aggregates) instead of
/// failing the whole query.
fn effort_column(row: &Row, idx: usize, task_id: Uuid) -> rusqlite::Result<Option<EffortHours>> {
    let parsed = match row.get_ref(idx)? {
        ValueRef::Null => return Ok(None),
        ValueRef::Real(hours) => EffortHours::new(hours).ok(),
        ValueRef::Integer(hours) => EffortHours::new(hours as f64).ok(),
        ValueRef::Text(text) => std::str::from_utf8(text)
            .ok()
            .and_then(|s| EffortInput::Text(s.to_string()).parse().ok())
            .flatten(),
        ValueRef::Blob(_) => None,
    };
    if parsed.is_none() {
        tracing::warn!(task_id = %task_id, column = idx, "Ignoring unreadable effort value");
    }
    Ok(parsed)
}

fn conversion_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
