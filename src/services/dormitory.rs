//! Boarding rooms and bed allocation

use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::{optional, required, ServiceError, ServiceResult};
use crate::db::repositories::{
    AllocateOutcome, DormitoryRepository, NewRoom, RoomChange, StudentRepository, VacateOutcome,
};
use crate::db::DynDatabasePool;
use crate::models::{BedAllocation, DormRoom};

#[derive(Debug, Clone, Deserialize)]
pub struct AllocateInput {
    pub student_id: i64,
    #[serde(default)]
    pub allocated_on: Option<NaiveDate>,
}

pub struct DormitoryService {
    dormitory: DormitoryRepository,
    students: StudentRepository,
}

fn capacity(value: i64) -> ServiceResult<i64> {
    if value < 1 {
        return Err(ServiceError::Validation("capacity must be at least 1".to_string()));
    }
    Ok(value)
}

fn occupied(count: i64) -> ServiceError {
    ServiceError::Conflict(format!("Room has {} occupied beds", count))
}

impl DormitoryService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            dormitory: DormitoryRepository::new(db.clone()),
            students: StudentRepository::new(db),
        }
    }

    pub async fn create_room(&self, input: NewRoom) -> ServiceResult<DormRoom> {
        let input = NewRoom {
            name: required("Name", &input.name)?,
            block: optional(&input.block),
            gender: optional(&input.gender).map(|g| g.to_lowercase()),
            capacity: capacity(input.capacity)?,
        };
        self.dormitory
            .create_room(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "A room with this name exists"))
    }

    pub async fn get_room(&self, id: i64) -> ServiceResult<DormRoom> {
        self.dormitory
            .get_room(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Room", id))
    }

    pub async fn list_rooms(&self) -> ServiceResult<Vec<DormRoom>> {
        Ok(self.dormitory.list_rooms().await?)
    }

    /// Resize a room; it may not shrink below its current occupancy
    pub async fn update_capacity(&self, id: i64, new_capacity: i64) -> ServiceResult<DormRoom> {
        match self.dormitory.update_capacity(id, capacity(new_capacity)?).await? {
            RoomChange::Done => self.get_room(id).await,
            RoomChange::NotFound => Err(ServiceError::not_found("Room", id)),
            RoomChange::Occupied(count) => Err(occupied(count)),
        }
    }

    pub async fn delete_room(&self, id: i64) -> ServiceResult<()> {
        match self.dormitory.delete_room(id).await? {
            RoomChange::Done => Ok(()),
            RoomChange::NotFound => Err(ServiceError::not_found("Room", id)),
            RoomChange::Occupied(count) => Err(occupied(count)),
        }
    }

    pub async fn allocate(&self, room_id: i64, input: AllocateInput) -> ServiceResult<BedAllocation> {
        if self.students.get(input.student_id).await?.is_none() {
            return Err(ServiceError::Validation(format!("Student {} does not exist", input.student_id)));
        }
        let allocated_on = input.allocated_on.unwrap_or_else(|| Utc::now().date_naive());

        match self.dormitory.allocate(room_id, input.student_id, allocated_on).await? {
            AllocateOutcome::Allocated(id) => self.get_allocation(id).await,
            AllocateOutcome::RoomNotFound => Err(ServiceError::not_found("Room", room_id)),
            AllocateOutcome::RoomFull => Err(ServiceError::Conflict("Room is full".to_string())),
            AllocateOutcome::StudentAlreadyAllocated => Err(ServiceError::Conflict(
                "Student already holds a bed".to_string(),
            )),
        }
    }

    pub async fn vacate(&self, allocation_id: i64, vacated_on: Option<NaiveDate>) -> ServiceResult<BedAllocation> {
        let vacated_on = vacated_on.unwrap_or_else(|| Utc::now().date_naive());
        let current = self.get_allocation(allocation_id).await?;
        if vacated_on < current.allocated_on {
            return Err(ServiceError::Validation(
                "vacated_on must not be before allocated_on".to_string(),
            ));
        }

        match self.dormitory.vacate(allocation_id, vacated_on).await? {
            VacateOutcome::Vacated => self.get_allocation(allocation_id).await,
            VacateOutcome::NotFound => Err(ServiceError::not_found("Allocation", allocation_id)),
            VacateOutcome::AlreadyVacated => {
                Err(ServiceError::Conflict("Bed was already vacated".to_string()))
            }
        }
    }

    pub async fn get_allocation(&self, id: i64) -> ServiceResult<BedAllocation> {
        self.dormitory
            .get_allocation(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Allocation", id))
    }

    pub async fn list_allocations(&self, room_id: Option<i64>, active_only: bool) -> ServiceResult<Vec<BedAllocation>> {
        Ok(self.dormitory.list_allocations(room_id, active_only).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{AcademicsRepository, NewClass, NewStudent};
    use crate::db::{create_test_pool, migrations};

    async fn seeded(students: usize) -> (DormitoryService, Vec<i64>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        let class = AcademicsRepository::new(pool.clone())
            .create_class(&NewClass { name: "Form 3".to_string(), class_teacher_id: None })
            .await
            .unwrap();
        let repo = StudentRepository::new(pool.clone());
        let mut ids = Vec::new();
        for i in 0..students {
            let student = repo
                .create(&NewStudent {
                    admission_number: format!("D-{}", i),
                    first_name: format!("Boarder{}", i),
                    last_name: "Otieno".to_string(),
                    gender: "male".to_string(),
                    date_of_birth: None,
                    class_id: class.id,
                    guardian_name: None,
                    guardian_phone: None,
                    status: Default::default(),
                })
                .await
                .unwrap();
            ids.push(student.id);
        }
        (DormitoryService::new(pool), ids)
    }

    fn room(capacity: i64) -> NewRoom {
        NewRoom {
            name: "Kilimanjaro 1".to_string(),
            block: Some("Kilimanjaro".to_string()),
            gender: Some("Male".to_string()),
            capacity,
        }
    }

    fn bed(student_id: i64) -> AllocateInput {
        AllocateInput { student_id, allocated_on: None }
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let (service, students) = seeded(3).await;
        assert!(matches!(service.create_room(room(0)).await, Err(ServiceError::Validation(_))));
        let created = service.create_room(room(2)).await.unwrap();
        assert_eq!(created.gender.as_deref(), Some("male"));

        service.allocate(created.id, bed(students[0])).await.unwrap();
        service.allocate(created.id, bed(students[1])).await.unwrap();
        assert!(matches!(
            service.allocate(created.id, bed(students[2])).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(service.update_capacity(created.id, 1).await, Err(ServiceError::Conflict(_))));
        assert!(matches!(service.delete_room(created.id).await, Err(ServiceError::Conflict(_))));

        let grown = service.update_capacity(created.id, 3).await.unwrap();
        assert_eq!(grown.free_beds(), 1);
        service.allocate(created.id, bed(students[2])).await.unwrap();
    }

    #[tokio::test]
    async fn test_one_bed_per_student() {
        let (service, students) = seeded(1).await;
        let created = service.create_room(room(4)).await.unwrap();
        let allocation = service.allocate(created.id, bed(students[0])).await.unwrap();
        assert!(matches!(
            service.allocate(created.id, bed(students[0])).await,
            Err(ServiceError::Conflict(_))
        ));

        let vacated = service.vacate(allocation.id, None).await.unwrap();
        assert!(vacated.vacated_on.is_some());
        assert!(matches!(service.vacate(allocation.id, None).await, Err(ServiceError::Conflict(_))));
        assert!(service.list_allocations(Some(created.id), true).await.unwrap().is_empty());
        assert_eq!(service.list_allocations(None, false).await.unwrap().len(), 1);

        service.allocate(created.id, bed(students[0])).await.unwrap();
        assert!(matches!(
            service.allocate(999, bed(students[0])).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(service.allocate(created.id, bed(999)).await, Err(ServiceError::Validation(_))));
    }
}
