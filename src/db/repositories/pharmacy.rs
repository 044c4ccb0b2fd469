//! Pharmacy repository: medication stock, clinic visits, dispensations

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{ClinicVisit, Dispensation, Medication};

const MEDICATION_COLUMNS: &str = "id, name, unit, stock_quantity, reorder_level, created_at";
const VISIT_SELECT: &str = "SELECT v.id, v.student_id, s.admission_number, s.first_name, s.last_name, \
     v.complaint, v.diagnosis, v.visited_on, v.attended_by, v.created_at \
     FROM clinic_visits v JOIN students s ON s.id = v.student_id";
const DISPENSATION_SELECT: &str = "SELECT d.id, d.visit_id, d.medication_id, m.name AS medication_name, \
     d.quantity, d.dispensed_by, d.created_at \
     FROM dispensations d JOIN medications m ON m.id = d.medication_id";

#[derive(Debug, Clone, Deserialize)]
pub struct NewMedication {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub reorder_level: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVisit {
    pub student_id: i64,
    pub complaint: String,
    #[serde(default)]
    pub diagnosis: Option<String>,
    pub visited_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispenseOutcome {
    Dispensed(i64),
    VisitNotFound,
    MedicationNotFound,
    InsufficientStock { available: i64 },
}

pub struct PharmacyRepository {
    pool: DynDatabasePool,
}

impl PharmacyRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub async fn create_medication(&self, input: &NewMedication) -> Result<Medication> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO medications (name, unit, stock_quantity, reorder_level) VALUES (?, ?, ?, ?)",
            )
            .bind(&input.name)
            .bind(&input.unit)
            .bind(input.stock_quantity)
            .bind(input.reorder_level)
            .execute(p)
            .await
            .context("Failed to insert medication")?
            .inserted_id()
        });

        self.get_medication(id).await?.context("Medication missing after insert")
    }

    pub async fn get_medication(&self, id: i64) -> Result<Option<Medication>> {
        let sql = format!("SELECT {} FROM medications WHERE id = ?", MEDICATION_COLUMNS);
        let medication = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Medication>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(medication)
    }

    pub async fn list_medications(&self) -> Result<Vec<Medication>> {
        let sql = format!("SELECT {} FROM medications ORDER BY name", MEDICATION_COLUMNS);
        let medications = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Medication>(&sql).fetch_all(p).await?
        });
        Ok(medications)
    }

    /// Medications at or below their reorder level
    pub async fn low_stock(&self) -> Result<Vec<Medication>> {
        let sql = format!(
            "SELECT {} FROM medications WHERE stock_quantity <= reorder_level ORDER BY stock_quantity, name",
            MEDICATION_COLUMNS
        );
        let medications = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Medication>(&sql).fetch_all(p).await?
        });
        Ok(medications)
    }

    pub async fn count_low_stock(&self) -> Result<i64> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM medications WHERE stock_quantity <= reorder_level",
            )
            .fetch_one(p)
            .await?
        });
        Ok(count)
    }

    /// Add `quantity` units to stock. Returns `false` for an unknown medication.
    pub async fn restock(&self, id: i64, quantity: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("UPDATE medications SET stock_quantity = stock_quantity + ? WHERE id = ?")
                .bind(quantity)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to restock medication")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    pub async fn delete_medication(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM medications WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete medication")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    // Clinic visits

    pub async fn create_visit(&self, input: &NewVisit, attended_by: Option<i64>) -> Result<ClinicVisit> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO clinic_visits (student_id, complaint, diagnosis, visited_on, attended_by) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(input.student_id)
            .bind(&input.complaint)
            .bind(&input.diagnosis)
            .bind(input.visited_on)
            .bind(attended_by)
            .execute(p)
            .await
            .context("Failed to insert clinic visit")?
            .inserted_id()
        });

        self.get_visit(id).await?.context("Clinic visit missing after insert")
    }

    pub async fn get_visit(&self, id: i64) -> Result<Option<ClinicVisit>> {
        let sql = format!("{} WHERE v.id = ?", VISIT_SELECT);
        let visit = on_pool!(self.pool, p => {
            sqlx::query_as::<_, ClinicVisit>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(visit)
    }

    pub async fn list_visits(&self, student_id: Option<i64>) -> Result<Vec<ClinicVisit>> {
        let visits = match student_id {
            Some(student_id) => {
                let sql = format!("{} WHERE v.student_id = ? ORDER BY v.visited_on DESC, v.id DESC", VISIT_SELECT);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, ClinicVisit>(&sql).bind(student_id).fetch_all(p).await?
                })
            }
            None => {
                let sql = format!("{} ORDER BY v.visited_on DESC, v.id DESC", VISIT_SELECT);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, ClinicVisit>(&sql).fetch_all(p).await?
                })
            }
        };
        Ok(visits)
    }

    // Dispensations

    /// Hand out medication against a visit, decrementing stock in the same
    /// transaction. Stock never goes below zero.
    pub async fn dispense(
        &self,
        visit_id: i64,
        medication_id: i64,
        quantity: i64,
        dispensed_by: Option<i64>,
    ) -> Result<DispenseOutcome> {
        let outcome = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let visit = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clinic_visits WHERE id = ?")
                .bind(visit_id)
                .fetch_one(&mut *tx)
                .await?;
            if visit == 0 {
                tx.rollback().await?;
                return Ok(DispenseOutcome::VisitNotFound);
            }

            let taken = sqlx::query(
                "UPDATE medications SET stock_quantity = stock_quantity - ? WHERE id = ? AND stock_quantity >= ?",
            )
            .bind(quantity)
            .bind(medication_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await
            .context("Failed to decrement stock")?
            .rows_affected();

            if taken != 1 {
                let stock = sqlx::query_scalar::<_, i64>("SELECT stock_quantity FROM medications WHERE id = ?")
                    .bind(medication_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                tx.rollback().await?;
                match stock {
                    None => DispenseOutcome::MedicationNotFound,
                    Some(available) => DispenseOutcome::InsufficientStock { available },
                }
            } else {
                let id = sqlx::query(
                    "INSERT INTO dispensations (visit_id, medication_id, quantity, dispensed_by) VALUES (?, ?, ?, ?)",
                )
                .bind(visit_id)
                .bind(medication_id)
                .bind(quantity)
                .bind(dispensed_by)
                .execute(&mut *tx)
                .await
                .context("Failed to insert dispensation")?
                .inserted_id();
                tx.commit().await.context("Failed to commit dispensation")?;
                DispenseOutcome::Dispensed(id)
            }
        });
        Ok(outcome)
    }

    /// Remove a dispensation and put its quantity back into stock
    pub async fn delete_dispensation(&self, id: i64) -> Result<bool> {
        let found = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let row = sqlx::query_as::<_, (i64, i64)>(
                "SELECT medication_id, quantity FROM dispensations WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                None => false,
                Some((medication_id, quantity)) => {
                    let removed = sqlx::query("DELETE FROM dispensations WHERE id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    if removed != 1 {
                        tx.rollback().await?;
                        return Ok(false);
                    }
                    sqlx::query("UPDATE medications SET stock_quantity = stock_quantity + ? WHERE id = ?")
                        .bind(quantity)
                        .bind(medication_id)
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await.context("Failed to delete dispensation")?;
                    true
                }
            }
        });
        Ok(found)
    }

    pub async fn get_dispensation(&self, id: i64) -> Result<Option<Dispensation>> {
        let sql = format!("{} WHERE d.id = ?", DISPENSATION_SELECT);
        let dispensation = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Dispensation>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(dispensation)
    }

    pub async fn list_dispensations(&self, visit_id: i64) -> Result<Vec<Dispensation>> {
        let sql = format!("{} WHERE d.visit_id = ? ORDER BY d.id", DISPENSATION_SELECT);
        let rows = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Dispensation>(&sql).bind(visit_id).fetch_all(p).await?
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn seeded() -> (PharmacyRepository, i64, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        pool.execute("INSERT INTO classes (name) VALUES ('Form 4')").await.unwrap();
        pool.execute(
            "INSERT INTO students (admission_number, first_name, last_name, gender, class_id) VALUES ('P1', 'Sam', 'Kariuki', 'male', 1)",
        )
        .await
        .unwrap();
        let repo = PharmacyRepository::new(pool);
        let med = repo
            .create_medication(&NewMedication {
                name: "Paracetamol".to_string(),
                unit: "tablet".to_string(),
                stock_quantity: 10,
                reorder_level: 4,
            })
            .await
            .unwrap();
        let visit = repo
            .create_visit(
                &NewVisit {
                    student_id: 1,
                    complaint: "Headache".to_string(),
                    diagnosis: None,
                    visited_on: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
                },
                None,
            )
            .await
            .unwrap();
        (repo, med.id, visit.id)
    }

    #[tokio::test]
    async fn test_dispense_decrements_and_refuses_overdraw() {
        let (repo, med_id, visit_id) = seeded().await;

        let outcome = repo.dispense(visit_id, med_id, 7, None).await.unwrap();
        assert!(matches!(outcome, DispenseOutcome::Dispensed(_)));
        assert_eq!(repo.get_medication(med_id).await.unwrap().unwrap().stock_quantity, 3);

        assert_eq!(
            repo.dispense(visit_id, med_id, 4, None).await.unwrap(),
            DispenseOutcome::InsufficientStock { available: 3 }
        );
        assert_eq!(repo.dispense(999, med_id, 1, None).await.unwrap(), DispenseOutcome::VisitNotFound);
        assert_eq!(repo.low_stock().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refused_dispense_records_nothing() {
        let (repo, med_id, visit_id) = seeded().await;

        assert_eq!(
            repo.dispense(visit_id, med_id, 11, None).await.unwrap(),
            DispenseOutcome::InsufficientStock { available: 10 }
        );
        assert_eq!(
            repo.dispense(visit_id, 777, 1, None).await.unwrap(),
            DispenseOutcome::MedicationNotFound
        );
        assert!(repo.list_dispensations(visit_id).await.unwrap().is_empty());
        assert_eq!(repo.get_medication(med_id).await.unwrap().unwrap().stock_quantity, 10);
    }

    #[tokio::test]
    async fn test_delete_dispensation_restores_stock() {
        let (repo, med_id, visit_id) = seeded().await;
        let DispenseOutcome::Dispensed(id) = repo.dispense(visit_id, med_id, 5, None).await.unwrap() else {
            panic!("not dispensed");
        };
        assert_eq!(repo.list_dispensations(visit_id).await.unwrap()[0].medication_name, "Paracetamol");

        assert!(repo.delete_dispensation(id).await.unwrap());
        assert_eq!(repo.get_medication(med_id).await.unwrap().unwrap().stock_quantity, 10);
        assert!(!repo.delete_dispensation(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_restock() {
        let (repo, med_id, _) = seeded().await;
        assert!(repo.restock(med_id, 15).await.unwrap());
        assert_eq!(repo.get_medication(med_id).await.unwrap().unwrap().stock_quantity, 25);
        assert!(!repo.restock(404, 1).await.unwrap());
        assert_eq!(repo.count_low_stock().await.unwrap(), 0);
    }
}
