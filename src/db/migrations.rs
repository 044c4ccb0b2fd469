//! Database migrations
//!
//! Migrations are embedded as SQL strings, with one variant per backend.
//! There are two independent sets:
//! - [`PLATFORM_MIGRATIONS`] for the registry database,
//! - [`TENANT_MIGRATIONS`] applied to every school database when the tenant
//!   resolver first connects to it.
//!
//! Applied versions are tracked in a `schema_migrations` table inside each
//! database.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::{on_pool, DynDatabasePool};
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential within a set)
    pub version: i64,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Registry schema: schools, platform operators and login sessions.
pub const PLATFORM_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_schools",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS schools (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code VARCHAR(32) NOT NULL UNIQUE,
                name VARCHAR(200) NOT NULL,
                database_url VARCHAR(500) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS schools (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                code VARCHAR(32) NOT NULL UNIQUE,
                name VARCHAR(200) NOT NULL,
                database_url VARCHAR(500) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_super_admins",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS super_admins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(120) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS super_admins (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(120) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                school_code VARCHAR(32),
                role VARCHAR(20) NOT NULL,
                name VARCHAR(120) NOT NULL,
                email VARCHAR(255) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_school_code ON sessions(school_code);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                school_code VARCHAR(32),
                role VARCHAR(20) NOT NULL,
                name VARCHAR(120) NOT NULL,
                email VARCHAR(255) NOT NULL,
                expires_at DATETIME NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
            CREATE INDEX idx_sessions_school_code ON sessions(school_code);
        "#,
    },
];

/// Per-school schema.
pub const TENANT_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(120) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(120) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_academics",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS academic_years (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS terms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                academic_year_id INTEGER NOT NULL,
                name VARCHAR(50) NOT NULL,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (academic_year_id, name),
                FOREIGN KEY (academic_year_id) REFERENCES academic_years(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS classes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(80) NOT NULL UNIQUE,
                class_teacher_id INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (class_teacher_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(80) NOT NULL,
                code VARCHAR(20) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS academic_years (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS terms (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                academic_year_id BIGINT NOT NULL,
                name VARCHAR(50) NOT NULL,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uq_terms_year_name (academic_year_id, name),
                FOREIGN KEY (academic_year_id) REFERENCES academic_years(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS classes (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(80) NOT NULL UNIQUE,
                class_teacher_id BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (class_teacher_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS subjects (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(80) NOT NULL,
                code VARCHAR(20) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_students",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                admission_number VARCHAR(40) NOT NULL UNIQUE,
                first_name VARCHAR(80) NOT NULL,
                last_name VARCHAR(80) NOT NULL,
                gender VARCHAR(10) NOT NULL,
                date_of_birth DATE,
                class_id INTEGER NOT NULL,
                guardian_name VARCHAR(120),
                guardian_phone VARCHAR(40),
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (class_id) REFERENCES classes(id)
            );
            CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id);
            CREATE INDEX IF NOT EXISTS idx_students_status ON students(status);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS students (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                admission_number VARCHAR(40) NOT NULL UNIQUE,
                first_name VARCHAR(80) NOT NULL,
                last_name VARCHAR(80) NOT NULL,
                gender VARCHAR(10) NOT NULL,
                date_of_birth DATE,
                class_id BIGINT NOT NULL,
                guardian_name VARCHAR(120),
                guardian_phone VARCHAR(40),
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (class_id) REFERENCES classes(id)
            );
            CREATE INDEX idx_students_status ON students(status);
        "#,
    },
    Migration {
        version: 4,
        name: "create_exams",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS exams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                term_id INTEGER NOT NULL,
                name VARCHAR(80) NOT NULL,
                max_score REAL NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (term_id, name),
                FOREIGN KEY (term_id) REFERENCES terms(id)
            );
            CREATE TABLE IF NOT EXISTS marks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exam_id INTEGER NOT NULL,
                student_id INTEGER NOT NULL,
                subject_id INTEGER NOT NULL,
                score REAL NOT NULL,
                recorded_by INTEGER,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (exam_id, student_id, subject_id),
                FOREIGN KEY (exam_id) REFERENCES exams(id) ON DELETE CASCADE,
                FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS exams (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                term_id BIGINT NOT NULL,
                name VARCHAR(80) NOT NULL,
                max_score DOUBLE NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uq_exams_term_name (term_id, name),
                FOREIGN KEY (term_id) REFERENCES terms(id)
            );
            CREATE TABLE IF NOT EXISTS marks (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                exam_id BIGINT NOT NULL,
                student_id BIGINT NOT NULL,
                subject_id BIGINT NOT NULL,
                score DOUBLE NOT NULL,
                recorded_by BIGINT,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                UNIQUE KEY uq_marks_entry (exam_id, student_id, subject_id),
                FOREIGN KEY (exam_id) REFERENCES exams(id) ON DELETE CASCADE,
                FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 5,
        name: "create_finance",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_number VARCHAR(20) UNIQUE,
                student_id INTEGER NOT NULL,
                term_id INTEGER,
                description VARCHAR(255) NOT NULL,
                total_amount INTEGER NOT NULL,
                amount_paid INTEGER NOT NULL DEFAULT 0,
                due_date DATE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (student_id) REFERENCES students(id),
                FOREIGN KEY (term_id) REFERENCES terms(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_invoices_student ON invoices(student_id);
            CREATE INDEX IF NOT EXISTS idx_invoices_term ON invoices(term_id);
            CREATE TABLE IF NOT EXISTS fee_payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_id INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                method VARCHAR(20) NOT NULL,
                reference VARCHAR(100),
                paid_on DATE NOT NULL,
                received_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (invoice_id) REFERENCES invoices(id)
            );
            CREATE INDEX IF NOT EXISTS idx_fee_payments_paid_on ON fee_payments(paid_on);
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category VARCHAR(80) NOT NULL,
                description VARCHAR(255) NOT NULL,
                amount INTEGER NOT NULL,
                spent_on DATE NOT NULL,
                recorded_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_expenses_spent_on ON expenses(spent_on);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS invoices (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                invoice_number VARCHAR(20) UNIQUE,
                student_id BIGINT NOT NULL,
                term_id BIGINT,
                description VARCHAR(255) NOT NULL,
                total_amount BIGINT NOT NULL,
                amount_paid BIGINT NOT NULL DEFAULT 0,
                due_date DATE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (student_id) REFERENCES students(id),
                FOREIGN KEY (term_id) REFERENCES terms(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS fee_payments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                invoice_id BIGINT NOT NULL,
                amount BIGINT NOT NULL,
                method VARCHAR(20) NOT NULL,
                reference VARCHAR(100),
                paid_on DATE NOT NULL,
                received_by BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (invoice_id) REFERENCES invoices(id)
            );
            CREATE INDEX idx_fee_payments_paid_on ON fee_payments(paid_on);
            CREATE TABLE IF NOT EXISTS expenses (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                category VARCHAR(80) NOT NULL,
                description VARCHAR(255) NOT NULL,
                amount BIGINT NOT NULL,
                spent_on DATE NOT NULL,
                recorded_by BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_expenses_spent_on ON expenses(spent_on);
        "#,
    },
    Migration {
        version: 6,
        name: "create_library",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                author VARCHAR(255) NOT NULL,
                isbn VARCHAR(20) UNIQUE,
                total_copies INTEGER NOT NULL,
                available_copies INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK (available_copies >= 0 AND available_copies <= total_copies)
            );
            CREATE TABLE IF NOT EXISTS book_loans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_id INTEGER NOT NULL,
                student_id INTEGER NOT NULL,
                issued_on DATE NOT NULL,
                due_on DATE NOT NULL,
                returned_on DATE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (book_id) REFERENCES books(id),
                FOREIGN KEY (student_id) REFERENCES students(id)
            );
            CREATE INDEX IF NOT EXISTS idx_book_loans_book ON book_loans(book_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS books (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                author VARCHAR(255) NOT NULL,
                isbn VARCHAR(20) UNIQUE,
                total_copies BIGINT NOT NULL,
                available_copies BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK (available_copies >= 0 AND available_copies <= total_copies)
            );
            CREATE TABLE IF NOT EXISTS book_loans (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                book_id BIGINT NOT NULL,
                student_id BIGINT NOT NULL,
                issued_on DATE NOT NULL,
                due_on DATE NOT NULL,
                returned_on DATE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (book_id) REFERENCES books(id),
                FOREIGN KEY (student_id) REFERENCES students(id)
            );
        "#,
    },
    Migration {
        version: 7,
        name: "create_pharmacy",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS medications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(120) NOT NULL UNIQUE,
                unit VARCHAR(30) NOT NULL,
                stock_quantity INTEGER NOT NULL DEFAULT 0,
                reorder_level INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK (stock_quantity >= 0)
            );
            CREATE TABLE IF NOT EXISTS clinic_visits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                complaint VARCHAR(255) NOT NULL,
                diagnosis VARCHAR(255),
                visited_on DATE NOT NULL,
                attended_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (student_id) REFERENCES students(id)
            );
            CREATE TABLE IF NOT EXISTS dispensations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                visit_id INTEGER NOT NULL,
                medication_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                dispensed_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (visit_id) REFERENCES clinic_visits(id),
                FOREIGN KEY (medication_id) REFERENCES medications(id)
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS medications (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(120) NOT NULL UNIQUE,
                unit VARCHAR(30) NOT NULL,
                stock_quantity BIGINT NOT NULL DEFAULT 0,
                reorder_level BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK (stock_quantity >= 0)
            );
            CREATE TABLE IF NOT EXISTS clinic_visits (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                student_id BIGINT NOT NULL,
                complaint VARCHAR(255) NOT NULL,
                diagnosis VARCHAR(255),
                visited_on DATE NOT NULL,
                attended_by BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (student_id) REFERENCES students(id)
            );
            CREATE TABLE IF NOT EXISTS dispensations (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                visit_id BIGINT NOT NULL,
                medication_id BIGINT NOT NULL,
                quantity BIGINT NOT NULL,
                dispensed_by BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (visit_id) REFERENCES clinic_visits(id),
                FOREIGN KEY (medication_id) REFERENCES medications(id)
            );
        "#,
    },
    Migration {
        version: 8,
        name: "create_dormitory",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS dorm_rooms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(80) NOT NULL UNIQUE,
                block VARCHAR(80),
                gender VARCHAR(10),
                capacity INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS bed_allocations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                student_id INTEGER NOT NULL,
                allocated_on DATE NOT NULL,
                vacated_on DATE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (room_id) REFERENCES dorm_rooms(id),
                FOREIGN KEY (student_id) REFERENCES students(id)
            );
            CREATE INDEX IF NOT EXISTS idx_bed_allocations_room ON bed_allocations(room_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS dorm_rooms (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(80) NOT NULL UNIQUE,
                block VARCHAR(80),
                gender VARCHAR(10),
                capacity BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS bed_allocations (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                room_id BIGINT NOT NULL,
                student_id BIGINT NOT NULL,
                allocated_on DATE NOT NULL,
                vacated_on DATE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (room_id) REFERENCES dorm_rooms(id),
                FOREIGN KEY (student_id) REFERENCES students(id)
            );
        "#,
    },
    Migration {
        version: 9,
        name: "create_timetable",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS timetable_slots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                class_id INTEGER NOT NULL,
                subject_id INTEGER NOT NULL,
                teacher_id INTEGER NOT NULL,
                day_of_week INTEGER NOT NULL,
                start_time TIME NOT NULL,
                end_time TIME NOT NULL,
                room VARCHAR(40),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (class_id) REFERENCES classes(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE,
                FOREIGN KEY (teacher_id) REFERENCES users(id)
            );
            CREATE INDEX IF NOT EXISTS idx_timetable_day ON timetable_slots(day_of_week);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS timetable_slots (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                class_id BIGINT NOT NULL,
                subject_id BIGINT NOT NULL,
                teacher_id BIGINT NOT NULL,
                day_of_week BIGINT NOT NULL,
                start_time TIME NOT NULL,
                end_time TIME NOT NULL,
                room VARCHAR(40),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (class_id) REFERENCES classes(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE,
                FOREIGN KEY (teacher_id) REFERENCES users(id)
            );
            CREATE INDEX idx_timetable_day ON timetable_slots(day_of_week);
        "#,
    },
    Migration {
        version: 10,
        name: "create_notices",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS notices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                body TEXT NOT NULL,
                audience VARCHAR(20) NOT NULL,
                created_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS notices (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(200) NOT NULL,
                body TEXT NOT NULL,
                audience VARCHAR(20) NOT NULL,
                created_by BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 11,
        name: "create_website",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS website_settings (
                setting_key VARCHAR(64) PRIMARY KEY,
                setting_value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS news_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE,
                excerpt VARCHAR(500),
                body TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at TIMESTAMP,
                author_id INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_news_status ON news_articles(status, published_at);
            CREATE TABLE IF NOT EXISTS gallery_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                image_url VARCHAR(500) NOT NULL,
                caption VARCHAR(500),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS website_settings (
                setting_key VARCHAR(64) PRIMARY KEY,
                setting_value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS news_articles (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE,
                excerpt VARCHAR(500),
                body TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at DATETIME,
                author_id BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_news_status ON news_articles(status, published_at);
            CREATE TABLE IF NOT EXISTS gallery_items (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(200) NOT NULL,
                image_url VARCHAR(500) NOT NULL,
                caption VARCHAR(500),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
];

/// Apply every pending migration of `set`, returning how many ran.
pub async fn run_migrations(pool: &DynDatabasePool, set: &[Migration]) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;

    for migration in set {
        if !applied_versions.contains(&migration.version) {
            tracing::info!("Applying migration {}: {}", migration.version, migration.name);
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// Get list of already applied migrations
pub async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    let records = on_pool!(pool, p => {
        sqlx::query_as::<_, MigrationRecord>(
            "SELECT version, name, applied_at FROM schema_migrations ORDER BY version",
        )
        .fetch_all(p)
        .await?
    });
    Ok(records)
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    on_pool!(pool, p => {
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(p)
            .await?;
    });

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if every migration of `set` has been applied
pub async fn is_up_to_date(pool: &DynDatabasePool, set: &[Migration]) -> Result<bool> {
    Ok(pending_count(pool, set).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool, set: &[Migration]) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    Ok(set
        .iter()
        .filter(|m| !applied.iter().any(|a| a.version == m.version))
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn table_exists(pool: &DynDatabasePool, table: &str) -> bool {
        let sqlite = pool.as_sqlite().unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(sqlite)
        .await
        .unwrap();
        count == 1
    }

    #[tokio::test]
    async fn test_run_platform_migrations() {
        let pool = create_test_pool().await.unwrap();
        let applied = run_migrations(&pool, PLATFORM_MIGRATIONS).await.unwrap();
        assert_eq!(applied, PLATFORM_MIGRATIONS.len());

        for table in ["schools", "super_admins", "sessions"] {
            assert!(table_exists(&pool, table).await, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_run_tenant_migrations() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool, TENANT_MIGRATIONS).await.unwrap();

        for table in [
            "users",
            "academic_years",
            "terms",
            "classes",
            "subjects",
            "students",
            "exams",
            "marks",
            "invoices",
            "fee_payments",
            "expenses",
            "books",
            "book_loans",
            "medications",
            "clinic_visits",
            "dispensations",
            "dorm_rooms",
            "bed_allocations",
            "timetable_slots",
            "notices",
            "website_settings",
            "news_articles",
            "gallery_items",
        ] {
            assert!(table_exists(&pool, table).await, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pending_count(&pool, TENANT_MIGRATIONS).await.unwrap(), TENANT_MIGRATIONS.len());

        run_migrations(&pool, TENANT_MIGRATIONS).await.unwrap();
        assert!(is_up_to_date(&pool, TENANT_MIGRATIONS).await.unwrap());
        assert_eq!(run_migrations(&pool, TENANT_MIGRATIONS).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stock_check_constraint() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool, TENANT_MIGRATIONS).await.unwrap();

        let result = pool
            .execute("INSERT INTO medications (name, unit, stock_quantity) VALUES ('x', 'tab', -1)")
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_versions_are_sequential() {
        for set in [PLATFORM_MIGRATIONS, TENANT_MIGRATIONS] {
            for (idx, migration) in set.iter().enumerate() {
                assert_eq!(migration.version, idx as i64 + 1);
            }
        }
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- comment\n;CREATE INDEX i ON a(id);  ";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }
}
