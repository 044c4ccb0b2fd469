//! Notice board

use super::{required, ServiceError, ServiceResult};
use crate::db::repositories::{NewNotice, NoticeRepository};
use crate::db::DynDatabasePool;
use crate::models::{Audience, Notice, Role};

pub struct NoticeService {
    notices: NoticeRepository,
}

impl NoticeService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            notices: NoticeRepository::new(db),
        }
    }

    pub async fn create(&self, input: NewNotice, created_by: Option<i64>) -> ServiceResult<Notice> {
        let input = NewNotice {
            title: required("Title", &input.title)?,
            body: required("Body", &input.body)?,
            audience: input.audience,
        };
        Ok(self.notices.create(&input, created_by).await?)
    }

    /// Notices the given role may read, newest first
    pub async fn list_for(&self, role: Role) -> ServiceResult<Vec<Notice>> {
        Ok(self.notices.list_for(Audience::visible_to(role)).await?)
    }

    pub async fn get_for(&self, id: i64, role: Role) -> ServiceResult<Notice> {
        match self.notices.get(id).await? {
            Some(notice) if Audience::visible_to(role).contains(&notice.audience) => Ok(notice),
            _ => Err(ServiceError::not_found("Notice", id)),
        }
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self.notices.delete(id).await? {
            return Err(ServiceError::not_found("Notice", id));
        }
        Ok(())
    }
}
