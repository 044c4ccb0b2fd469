//! School clinic: medication stock, visits and dispensing

use chrono::Utc;
use serde::Deserialize;

use super::{optional, positive, required, ServiceError, ServiceResult};
use crate::db::repositories::{
    DispenseOutcome, NewMedication, NewVisit, PharmacyRepository, StudentRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{ClinicVisit, Dispensation, Medication};

#[derive(Debug, Clone, Deserialize)]
pub struct DispenseInput {
    pub medication_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisitInput {
    pub student_id: i64,
    pub complaint: String,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub visited_on: Option<chrono::NaiveDate>,
}

pub struct PharmacyService {
    pharmacy: PharmacyRepository,
    students: StudentRepository,
}

impl PharmacyService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            pharmacy: PharmacyRepository::new(db.clone()),
            students: StudentRepository::new(db),
        }
    }

    pub async fn create_medication(&self, input: NewMedication) -> ServiceResult<Medication> {
        if input.stock_quantity < 0 || input.reorder_level < 0 {
            return Err(ServiceError::Validation(
                "stock_quantity and reorder_level cannot be negative".to_string(),
            ));
        }
        let input = NewMedication {
            name: required("Name", &input.name)?,
            unit: required("Unit", &input.unit)?,
            ..input
        };
        self.pharmacy
            .create_medication(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "A medication with this name exists"))
    }

    pub async fn list_medications(&self) -> ServiceResult<Vec<Medication>> {
        Ok(self.pharmacy.list_medications().await?)
    }

    pub async fn low_stock(&self) -> ServiceResult<Vec<Medication>> {
        Ok(self.pharmacy.low_stock().await?)
    }

    pub async fn restock(&self, id: i64, quantity: i64) -> ServiceResult<Medication> {
        let quantity = positive("quantity", quantity)?;
        if !self.pharmacy.restock(id, quantity).await? {
            return Err(ServiceError::not_found("Medication", id));
        }
        self.pharmacy
            .get_medication(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Medication", id))
    }

    pub async fn delete_medication(&self, id: i64) -> ServiceResult<()> {
        let deleted = self
            .pharmacy
            .delete_medication(id)
            .await
            .map_err(|e| ServiceError::from_delete(e, "Medication"))?;
        if !deleted {
            return Err(ServiceError::not_found("Medication", id));
        }
        Ok(())
    }

    pub async fn create_visit(&self, input: VisitInput, attended_by: Option<i64>) -> ServiceResult<ClinicVisit> {
        if self.students.get(input.student_id).await?.is_none() {
            return Err(ServiceError::Validation(format!("Student {} does not exist", input.student_id)));
        }
        let visit = NewVisit {
            student_id: input.student_id,
            complaint: required("Complaint", &input.complaint)?,
            diagnosis: optional(&input.diagnosis),
            visited_on: input.visited_on.unwrap_or_else(|| Utc::now().date_naive()),
        };
        Ok(self.pharmacy.create_visit(&visit, attended_by).await?)
    }

    pub async fn get_visit(&self, id: i64) -> ServiceResult<ClinicVisit> {
        self.pharmacy
            .get_visit(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Visit", id))
    }

    pub async fn list_visits(&self, student_id: Option<i64>) -> ServiceResult<Vec<ClinicVisit>> {
        Ok(self.pharmacy.list_visits(student_id).await?)
    }

    pub async fn list_dispensations(&self, visit_id: i64) -> ServiceResult<Vec<Dispensation>> {
        self.get_visit(visit_id).await?;
        Ok(self.pharmacy.list_dispensations(visit_id).await?)
    }

    /// Dispense against a visit; refused when stock would go negative
    pub async fn dispense(
        &self,
        visit_id: i64,
        input: DispenseInput,
        dispensed_by: Option<i64>,
    ) -> ServiceResult<Dispensation> {
        let quantity = positive("quantity", input.quantity)?;

        match self
            .pharmacy
            .dispense(visit_id, input.medication_id, quantity, dispensed_by)
            .await?
        {
            DispenseOutcome::Dispensed(id) => self
                .pharmacy
                .get_dispensation(id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Dispensation", id)),
            DispenseOutcome::VisitNotFound => Err(ServiceError::not_found("Visit", visit_id)),
            DispenseOutcome::MedicationNotFound => {
                Err(ServiceError::not_found("Medication", input.medication_id))
            }
            DispenseOutcome::InsufficientStock { available } => Err(ServiceError::Conflict(format!(
                "Insufficient stock: {} available",
                available
            ))),
        }
    }

    /// Remove a dispensation and put its quantity back in stock
    pub async fn delete_dispensation(&self, id: i64) -> ServiceResult<()> {
        if !self.pharmacy.delete_dispensation(id).await? {
            return Err(ServiceError::not_found("Dispensation", id));
        }
        Ok(())
    }
}
