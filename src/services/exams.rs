//! Exams, mark entry and result sheets
//!
//! Grades use a fixed percentage scale (A ≥ 80, B ≥ 70, C ≥ 60, D ≥ 50,
//! E ≥ 40, otherwise F). Positions use competition ranking on the total:
//! tied students share a position and the next position is skipped.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use super::{required, ServiceError, ServiceResult};
use crate::db::repositories::{AcademicsRepository, ExamRepository, MarkEntry, NewExam};
use crate::db::DynDatabasePool;
use crate::models::{Exam, Mark, StudentResult, SubjectScore};

/// Letter grade for a percentage
pub fn grade_for(percentage: f64) -> char {
    match percentage {
        p if p >= 80.0 => 'A',
        p if p >= 70.0 => 'B',
        p if p >= 60.0 => 'C',
        p if p >= 50.0 => 'D',
        p if p >= 40.0 => 'E',
        _ => 'F',
    }
}

/// Competition rank of every score, highest first (1, 2, 2, 4)
pub fn competition_ranks(scores: &[f64]) -> Vec<usize> {
    let mut sorted: Vec<f64> = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    scores
        .iter()
        .map(|score| sorted.partition_point(|other| other > score) + 1)
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarksInput {
    pub subject_id: i64,
    pub entries: Vec<MarkEntry>,
}

pub struct ExamService {
    exams: ExamRepository,
    academics: AcademicsRepository,
}

impl ExamService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            exams: ExamRepository::new(db.clone()),
            academics: AcademicsRepository::new(db),
        }
    }

    pub async fn create(&self, input: NewExam) -> ServiceResult<Exam> {
        let input = NewExam {
            name: required("Exam name", &input.name)?,
            ..input
        };
        if !input.max_score.is_finite() || input.max_score <= 0.0 {
            return Err(ServiceError::Validation("max_score must be greater than zero".to_string()));
        }
        if self.academics.get_term(input.term_id).await?.is_none() {
            return Err(ServiceError::Validation(format!("Term {} does not exist", input.term_id)));
        }

        self.exams
            .create(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "This term already has an exam with that name"))
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Exam> {
        self.exams
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Exam", id))
    }

    pub async fn list(&self, term_id: Option<i64>) -> ServiceResult<Vec<Exam>> {
        Ok(self.exams.list(term_id).await?)
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self.exams.delete(id).await? {
            return Err(ServiceError::not_found("Exam", id));
        }
        Ok(())
    }

    /// Write the marks of one subject; all entries are stored or none
    pub async fn record_marks(
        &self,
        exam_id: i64,
        input: MarksInput,
        recorded_by: Option<i64>,
    ) -> ServiceResult<usize> {
        let exam = self.get(exam_id).await?;
        if self.academics.get_subject(input.subject_id).await?.is_none() {
            return Err(ServiceError::Validation(format!(
                "Subject {} does not exist",
                input.subject_id
            )));
        }
        if input.entries.is_empty() {
            return Err(ServiceError::Validation("No marks supplied".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &input.entries {
            if !seen.insert(entry.student_id) {
                return Err(ServiceError::Validation(format!(
                    "Student {} appears more than once",
                    entry.student_id
                )));
            }
            if !entry.score.is_finite() || entry.score < 0.0 || entry.score > exam.max_score {
                return Err(ServiceError::Validation(format!(
                    "Score {} for student {} is outside 0..={}",
                    entry.score, entry.student_id, exam.max_score
                )));
            }
        }

        self.exams
            .upsert_marks(exam_id, input.subject_id, &input.entries, recorded_by)
            .await
            .map_err(|e| ServiceError::from_db(e, "Duplicate mark entry"))
    }

    pub async fn marks(&self, exam_id: i64, class_id: Option<i64>) -> ServiceResult<Vec<Mark>> {
        self.get(exam_id).await?;
        Ok(self.exams.list_marks(exam_id, class_id).await?)
    }

    /// Result sheet ordered by position
    pub async fn results(&self, exam_id: i64, class_id: Option<i64>) -> ServiceResult<Vec<StudentResult>> {
        let exam = self.get(exam_id).await?;
        let marks = self.exams.list_marks(exam_id, class_id).await?;
        Ok(build_results(&marks, exam.max_score))
    }
}

/// Aggregate marks into per-student results with grades and positions
pub fn build_results(marks: &[Mark], max_score: f64) -> Vec<StudentResult> {
    let mut by_student: BTreeMap<i64, StudentResult> = BTreeMap::new();

    for mark in marks {
        let result = by_student.entry(mark.student_id).or_insert_with(|| StudentResult {
            student_id: mark.student_id,
            admission_number: mark.admission_number.clone(),
            name: format!("{} {}", mark.first_name, mark.last_name),
            subjects: Vec::new(),
            total: 0.0,
            average: 0.0,
            grade: 'F',
            position: 0,
        });
        result.subjects.push(SubjectScore {
            subject_id: mark.subject_id,
            subject_code: mark.subject_code.clone(),
            score: mark.score,
            grade: grade_for(mark.score / max_score * 100.0),
        });
        result.total += mark.score;
    }

    let mut results: Vec<StudentResult> = by_student.into_values().collect();
    for result in &mut results {
        let possible = result.subjects.len() as f64 * max_score;
        let percentage = if possible > 0.0 { result.total / possible * 100.0 } else { 0.0 };
        result.total = round2(result.total);
        result.average = round2(percentage);
        result.grade = grade_for(percentage);
    }

    let totals: Vec<f64> = results.iter().map(|r| r.total).collect();
    for (result, rank) in results.iter_mut().zip(competition_ranks(&totals)) {
        result.position = rank;
    }

    results.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{NewAcademicYear, NewClass, NewStudent, NewSubject, NewTerm, StudentRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::{NaiveDate, Utc};
    use proptest::prelude::*;

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(grade_for(100.0), 'A');
        assert_eq!(grade_for(80.0), 'A');
        assert_eq!(grade_for(79.99), 'B');
        assert_eq!(grade_for(70.0), 'B');
        assert_eq!(grade_for(60.0), 'C');
        assert_eq!(grade_for(50.0), 'D');
        assert_eq!(grade_for(40.0), 'E');
        assert_eq!(grade_for(39.9), 'F');
        assert_eq!(grade_for(0.0), 'F');
    }

    #[test]
    fn test_competition_ranks_skip_after_ties() {
        assert_eq!(competition_ranks(&[90.0, 85.0, 85.0, 70.0]), vec![1, 2, 2, 4]);
        assert_eq!(competition_ranks(&[50.0, 50.0, 50.0]), vec![1, 1, 1]);
        assert_eq!(competition_ranks(&[10.0, 30.0, 20.0]), vec![3, 1, 2]);
        assert!(competition_ranks(&[]).is_empty());
    }

    fn mark(student_id: i64, subject_id: i64, score: f64) -> Mark {
        Mark {
            id: student_id * 10 + subject_id,
            exam_id: 1,
            student_id,
            admission_number: format!("ADM{}", student_id),
            first_name: format!("Student{}", student_id),
            last_name: "Test".to_string(),
            class_id: 1,
            subject_id,
            subject_code: format!("S{}", subject_id),
            subject_name: format!("Subject {}", subject_id),
            score,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_results() {
        let marks = vec![
            mark(1, 1, 90.0),
            mark(1, 2, 70.0),
            mark(2, 1, 80.0),
            mark(2, 2, 80.0),
            mark(3, 1, 30.0),
            mark(3, 2, 45.0),
        ];
        let results = build_results(&marks, 100.0);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].position, 1);
        assert_eq!(results[1].position, 1);
        assert_eq!(results[2].position, 3);
        assert_eq!(results[2].student_id, 3);
        assert_eq!(results[2].average, 37.5);
        assert_eq!(results[2].grade, 'F');
        assert_eq!(results[0].total, 160.0);
        assert_eq!(results[0].grade, 'A');
        assert_eq!(results[0].subjects.len(), 2);
    }

    async fn seeded() -> (ExamService, i64, i64, Vec<i64>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();

        let academics = AcademicsRepository::new(pool.clone());
        let year = academics
            .create_year(&NewAcademicYear {
                name: "2024".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            })
            .await
            .unwrap();
        let term = academics
            .create_term(&NewTerm {
                academic_year_id: year.id,
                name: "Term 1".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            })
            .await
            .unwrap();
        let class = academics
            .create_class(&NewClass { name: "Form 3".to_string(), class_teacher_id: None })
            .await
            .unwrap();
        let subject = academics
            .create_subject(&NewSubject { name: "Biology".to_string(), code: "BIO".to_string() })
            .await
            .unwrap();

        let students = StudentRepository::new(pool.clone());
        let mut ids = Vec::new();
        for adm in ["B1", "B2", "B3"] {
            let s = students
                .create(&NewStudent {
                    admission_number: adm.to_string(),
                    first_name: adm.to_string(),
                    last_name: "Kamau".to_string(),
                    gender: "male".to_string(),
                    date_of_birth: None,
                    class_id: class.id,
                    guardian_name: None,
                    guardian_phone: None,
                    status: Default::default(),
                })
                .await
                .unwrap();
            ids.push(s.id);
        }

        (ExamService::new(pool), term.id, subject.id, ids)
    }

    #[tokio::test]
    async fn test_marks_validation_and_results() {
        let (service, term_id, subject_id, students) = seeded().await;
        let exam = service
            .create(NewExam { term_id, name: "Midterm".to_string(), max_score: 50.0 })
            .await
            .unwrap();

        assert!(matches!(
            service.create(NewExam { term_id, name: "Midterm".to_string(), max_score: 50.0 }).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.create(NewExam { term_id: 999, name: "Final".to_string(), max_score: 50.0 }).await,
            Err(ServiceError::Validation(_))
        ));

        let too_high = MarksInput {
            subject_id,
            entries: vec![MarkEntry { student_id: students[0], score: 51.0 }],
        };
        assert!(matches!(service.record_marks(exam.id, too_high, None).await, Err(ServiceError::Validation(_))));

        let marks = MarksInput {
            subject_id,
            entries: vec![
                MarkEntry { student_id: students[0], score: 45.0 },
                MarkEntry { student_id: students[1], score: 30.0 },
                MarkEntry { student_id: students[2], score: 45.0 },
            ],
        };
        assert_eq!(service.record_marks(exam.id, marks, Some(1)).await.unwrap(), 3);

        let results = service.results(exam.id, None).await.unwrap();
        let positions: Vec<usize> = results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 1, 3]);
        assert_eq!(results[0].average, 90.0);
        assert_eq!(results[2].grade, 'C');
    }

    #[tokio::test]
    async fn test_unknown_student_rolls_back_batch() {
        let (service, term_id, subject_id, students) = seeded().await;
        let exam = service
            .create(NewExam { term_id, name: "Final".to_string(), max_score: 100.0 })
            .await
            .unwrap();

        let batch = MarksInput {
            subject_id,
            entries: vec![
                MarkEntry { student_id: students[0], score: 60.0 },
                MarkEntry { student_id: 9_999, score: 60.0 },
            ],
        };
        assert!(matches!(service.record_marks(exam.id, batch, None).await, Err(ServiceError::Validation(_))));
        assert!(service.marks(exam.id, None).await.unwrap().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn grade_is_monotonic(a in 0.0f64..100.0, b in 0.0f64..100.0) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(grade_for(high) <= grade_for(low));
        }

        #[test]
        fn ranks_respect_order_and_ties(scores in prop::collection::vec(0u32..20, 1..30)) {
            let scores: Vec<f64> = scores.into_iter().map(f64::from).collect();
            let ranks = competition_ranks(&scores);
            for i in 0..scores.len() {
                let better = scores.iter().filter(|s| **s > scores[i]).count();
                prop_assert_eq!(ranks[i], better + 1);
                for j in 0..scores.len() {
                    if scores[i] == scores[j] {
                        prop_assert_eq!(ranks[i], ranks[j]);
                    }
                }
            }
            prop_assert!(ranks.iter().any(|r| *r == 1));
        }
    }
}
