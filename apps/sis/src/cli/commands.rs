//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::ExportKind;
use crate::api;
use crate::config::Settings;
use chrono::Utc;
use sis_core::{
    ClassGroup, Course, Department, Enrollment, FeePlan, FeePlanId, Installment, Notification,
    Reader, Role, SisError, Store, User, accounts, export, fees,
};
use std::path::{Path, PathBuf};

/// Validate output path for security.
///
/// For output files, we validate the parent directory exists and is writable.
fn validate_output_path(path: &Path) -> Result<PathBuf, SisError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    // Canonicalize parent to resolve ".." and symlinks
    let canonical_parent = parent.canonicalize().map_err(|e| {
        SisError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(SisError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| SisError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP portal.
pub async fn cmd_server(settings: Settings) -> Result<(), SisError> {
    let store = Store::open(&settings.database)?;

    println!("SIS Portal Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:          {}", settings.host);
    println!("  Port:          {}", settings.port);
    println!("  Database:      {:?}", settings.database);
    println!("  Allowed hosts: {}", settings.allowed_hosts.join(", "));
    println!("  Rate limit:    {}/s", settings.rate_limit);
    println!();
    println!("Sections:");
    println!("  /accounts/login/  - Sign in");
    println!("  /dashboard/       - Home page for every role");
    println!("  /adminportal/     - Administration");
    println!("  /lecturer/        - Lecturer tools");
    println!("  /student/         - Student pages");
    println!("  /health           - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(store, settings).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), SisError> {
    if db_path.exists() {
        if !force {
            return Err(SisError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| SisError::IoError(format!("Remove database: {}", e)))?;
    }

    let _store = Store::open(db_path)?;
    println!("Initialized new database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// CREATE ADMIN COMMAND
// =============================================================================

/// Create a superuser.
pub fn cmd_create_admin(
    db_path: &Path,
    json_mode: bool,
    email: &str,
    password: &str,
    ic: Option<&str>,
    name: Option<&str>,
) -> Result<(), SisError> {
    let store = Store::open(db_path)?;
    let user = accounts::create_superuser(&store, email, password, ic, name, Utc::now())?;
    tracing::info!(user_id = user.id.0, "Superuser created");

    if json_mode {
        print_json(&serde_json::json!({
            "id": user.id.0,
            "email": user.email,
            "identity_card_number": user.identity_card_number,
            "full_name": user.full_name,
        }));
        return Ok(());
    }

    println!("Created administrator {} <{}>", user.full_name, user.email);
    Ok(())
}

/// Delete an account with its profile and records.
pub fn cmd_delete_user(db_path: &Path, json_mode: bool, email: &str) -> Result<(), SisError> {
    let store = Store::open(db_path)?;
    let user = accounts::user_by_email(&store.read()?, email)?.ok_or(SisError::NotFound("User"))?;
    accounts::delete_user(&store, user.id)?;
    tracing::info!(user_id = user.id.0, role = user.role.as_str(), "User deleted");

    if json_mode {
        print_json(&serde_json::json!({ "deleted": user.id.0, "email": user.email }));
        return Ok(());
    }

    println!("Deleted {} <{}>", user.full_name, user.email);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show record counts.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<(), SisError> {
    let store = Store::open(db_path)?;
    let r = store.read()?;

    let users = r.all::<User>()?;
    let count_role = |role: Role| users.iter().filter(|u| u.role == role).count();
    let admins = count_role(Role::Admin);
    let lecturers = count_role(Role::Lecturer);
    let students = count_role(Role::Student);
    let departments = r.count::<Department>()?;
    let courses = r.count::<Course>()?;
    let class_groups = r.count::<ClassGroup>()?;
    let enrollments = r.count::<Enrollment>()?;
    let fee_plans = r.count::<FeePlan>()?;
    let installments = r.count::<Installment>()?;
    let notifications = r.count::<Notification>()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": db_path.to_string_lossy(),
            "users": {
                "admins": admins,
                "lecturers": lecturers,
                "students": students
            },
            "departments": departments,
            "courses": courses,
            "class_groups": class_groups,
            "enrollments": enrollments,
            "fee_plans": fee_plans,
            "installments": installments,
            "notifications": notifications
        }));
        return Ok(());
    }

    println!("SIS Status");
    println!("==========");
    println!("Database: {:?}", db_path);
    println!();
    println!("Administrators: {}", admins);
    println!("Lecturers:      {}", lecturers);
    println!("Students:       {}", students);
    println!("Departments:    {}", departments);
    println!("Courses:        {}", courses);
    println!("Class groups:   {}", class_groups);
    println!("Enrollments:    {}", enrollments);
    println!("Fee plans:      {}", fee_plans);
    println!("Installments:   {}", installments);
    println!("Notifications:  {}", notifications);

    Ok(())
}

// =============================================================================
// INSTALLMENT COMMAND
// =============================================================================

/// Create or refresh the installments of one fee plan.
pub fn cmd_generate_installments(
    db_path: &Path,
    json_mode: bool,
    plan: u64,
) -> Result<(), SisError> {
    let store = Store::open(db_path)?;
    let plan_id = FeePlanId(plan);
    let rows = fees::ensure_installments(&store, plan_id)?;
    let summary = fees::plan_summary(&store.read()?, plan_id)?;

    if json_mode {
        print_json(&serde_json::json!({
            "plan": plan,
            "rows": rows,
            "installments": summary.installments.len(),
            "total_due": summary.total_due.to_string(),
            "balance": summary.balance.to_string(),
        }));
        return Ok(());
    }

    println!("Installments generated/updated ({} rows).", rows);
    for item in &summary.installments {
        println!(
            "  #{:<3} {}  {:>12}  {}",
            item.sequence_no,
            item.due_date,
            item.amount.to_string(),
            if item.is_paid { "PAID" } else { "UNPAID" }
        );
    }
    println!("Balance: {}", summary.balance);
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write one of the admin CSV reports to a file.
pub fn cmd_export(db_path: &Path, kind: ExportKind, output: &Path) -> Result<(), SisError> {
    let validated_output = validate_output_path(output)?;
    let store = Store::open(db_path)?;
    let r = store.read()?;

    let data = match kind {
        ExportKind::Lecturers => export::lecturers_csv(&r)?,
        ExportKind::Students => export::students_csv(&r)?,
        ExportKind::Courses => export::courses_csv(&r)?,
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| SisError::IoError(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_validate_output_path_rejects_missing_directory() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope").join("out.csv");
        assert!(validate_output_path(&missing).is_err());

        let ok = validate_output_path(&dir.path().join("out.csv")).expect("valid path");
        assert!(ok.ends_with("out.csv"));
    }

    #[test]
    fn test_init_refuses_existing_database() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("sis.redb");
        cmd_init(&db, false).expect("first init");
        assert!(cmd_init(&db, false).is_err());
        cmd_init(&db, true).expect("forced init");
    }

    #[test]
    fn test_delete_user_removes_account() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("sis.redb");
        cmd_create_admin(&db, false, "root@school.test", "secret", None, None).expect("admin");
        cmd_delete_user(&db, false, "ROOT@school.test").expect("delete");
        assert!(matches!(
            cmd_delete_user(&db, false, "root@school.test"),
            Err(SisError::NotFound("User"))
        ));

        let store = Store::open(&db).expect("open");
        assert_eq!(store.read().expect("read").count::<User>().expect("count"), 0);
    }

    #[test]
    fn test_export_writes_csv() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("sis.redb");
        cmd_init(&db, false).expect("init");
        let out = dir.path().join("courses.csv");
        cmd_export(&db, ExportKind::Courses, &out).expect("export");
        let text = std::fs::read_to_string(&out).expect("read csv");
        assert!(!text.is_empty());
    }
}
