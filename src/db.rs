use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ingest;
use crate::models::{
    Answer, AnswerKind, FeedbackRecord, FeedbackType, ParseError, Role, RosterEntry, SubjectInfo,
};

pub fn cutoff_date(since_days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(since_days.max(1))
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Blank roll numbers are stored as NULL so staff rows never collide.
fn roll_number_value(roll_number: &str) -> Option<&str> {
    Some(roll_number.trim()).filter(|roll| !roll.is_empty())
}

async fn upsert_student(pool: &PgPool, student: &RosterEntry) -> anyhow::Result<Uuid> {
    let roll_number = roll_number_value(&student.roll_number);
    let mut tx = pool.begin().await?;

    // A roll number moves with the student when their email changes.
    if let Some(roll) = roll_number {
        sqlx::query(
            "UPDATE course_feedback.students SET roll_number = NULL \
             WHERE roll_number = $1 AND email <> $2",
        )
        .bind(roll)
        .bind(&student.email)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to release roll number {roll}"))?;
    }

    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO course_feedback.students
        (id, roll_number, full_name, email, branch, year, role)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            roll_number = EXCLUDED.roll_number,
            branch = EXCLUDED.branch,
            year = EXCLUDED.year,
            role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(roll_number)
    .bind(&student.name)
    .bind(&student.email)
    .bind(&student.branch)
    .bind(student.year as i16)
    .bind(student.role.as_str())
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("failed to upsert student {}", student.email))?
    .get("id");

    tx.commit().await?;
    Ok(id)
}

async fn upsert_subject(pool: &PgPool, subject: &SubjectInfo) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO course_feedback.subjects (id, code, name, instructor, branch, year)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (code) DO UPDATE
        SET name = EXCLUDED.name,
            instructor = EXCLUDED.instructor,
            branch = EXCLUDED.branch,
            year = EXCLUDED.year
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&subject.code)
    .bind(&subject.name)
    .bind(&subject.instructor)
    .bind(&subject.branch)
    .bind(subject.year as i16)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert subject {}", subject.code))?
    .get("id");
    Ok(id)
}

/// Creates the subject on first sight. An existing subject keeps the name,
/// branch and year the roster import gave it.
async fn ensure_subject(pool: &PgPool, subject: &SubjectInfo) -> anyhow::Result<Uuid> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO course_feedback.subjects (id, code, name, instructor, branch, year)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (code) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&subject.code)
    .bind(&subject.name)
    .bind(&subject.instructor)
    .bind(&subject.branch)
    .bind(subject.year as i16)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to insert subject {}", subject.code))?;

    if let Some(row) = inserted {
        return Ok(row.get("id"));
    }

    let id: Uuid = sqlx::query("SELECT id FROM course_feedback.subjects WHERE code = $1")
        .bind(&subject.code)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to look up subject {}", subject.code))?
        .get("id");
    Ok(id)
}

/// Returns the id of the feedback header for the triple, creating it on
/// first sight. An existing header keeps its original `submitted_at`.
async fn ensure_feedback(
    pool: &PgPool,
    student_id: Uuid,
    subject_id: Uuid,
    feedback_type: FeedbackType,
    submitted_at: DateTime<Utc>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO course_feedback.feedback
        (id, student_id, subject_id, feedback_type, submitted_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (student_id, subject_id, feedback_type) DO UPDATE
        SET feedback_type = EXCLUDED.feedback_type
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(subject_id)
    .bind(feedback_type.as_str())
    .bind(submitted_at)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn insert_answer(
    pool: &PgPool,
    feedback_id: Uuid,
    position: i32,
    answer: &Answer,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO course_feedback.feedback_answers
        (id, feedback_id, position, question, kind, rating, comment)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (feedback_id, position) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(feedback_id)
    .bind(position)
    .bind(&answer.question)
    .bind(answer.kind.as_str())
    .bind(answer.rating)
    .bind(answer.comment.as_deref())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn student(roll: &str, name: &str, email: &str, branch: &str, year: u16) -> RosterEntry {
    RosterEntry {
        name: name.to_string(),
        email: email.to_string(),
        roll_number: roll.to_string(),
        branch: branch.to_string(),
        year,
        role: Role::Student,
    }
}

fn subject(code: &str, name: &str, instructor: &str, branch: &str, year: u16) -> SubjectInfo {
    SubjectInfo {
        code: code.to_string(),
        name: name.to_string(),
        instructor: instructor.to_string(),
        branch: branch.to_string(),
        year,
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        student("MCA24-01", "Asha Nair", "asha.nair@college.edu", "MCA Regular", 1),
        student("MCA24-02", "Vikram Shah", "vikram.shah@college.edu", "MCA Regular", 1),
        student("MCA24-03", "Farah Khan", "farah.khan@college.edu", "MCA Regular", 1),
        student("MCA24-11", "Rohan Das", "rohan.das@college.edu", "MCA Self Financed", 1),
        student("BCA23-07", "Meera Iyer", "meera.iyer@college.edu", "BCA", 2),
    ];
    let subjects = vec![
        subject("MCA101", "Data Structures", "Dr. Rao", "MCA Regular", 1),
        subject("MCA102", "Database Systems", "Prof. Menon", "MCA Regular", 1),
        subject("MCA151", "Web Technologies", "Prof. Gill", "MCA Self Financed", 1),
        subject("BCA201", "Operating Systems", "Dr. Pillai", "BCA", 2),
    ];

    let mut student_ids = HashMap::new();
    for entry in &students {
        student_ids.insert(entry.email.clone(), upsert_student(pool, entry).await?);
    }
    let mut subject_ids = HashMap::new();
    for entry in &subjects {
        subject_ids.insert(entry.code.clone(), upsert_subject(pool, entry).await?);
    }

    let submissions: Vec<(&str, &str, FeedbackType, [f64; 3], Option<&str>, (u32, u32))> = vec![
        ("asha.nair@college.edu", "MCA101", FeedbackType::Midterm, [4.0, 5.0, 4.0], Some("Examples in class help a lot"), (2, 10)),
        ("vikram.shah@college.edu", "MCA101", FeedbackType::Midterm, [5.0, 4.0, 5.0], None, (2, 11)),
        ("farah.khan@college.edu", "MCA102", FeedbackType::Midterm, [3.0, 3.0, 0.0], Some("Lab sessions feel rushed"), (2, 12)),
        ("asha.nair@college.edu", "MCA102", FeedbackType::Endterm, [4.0, 4.0, 5.0], None, (4, 20)),
        ("rohan.das@college.edu", "MCA151", FeedbackType::Midterm, [2.0, 3.0, 3.0], Some("Assignments need clearer briefs"), (2, 14)),
        ("meera.iyer@college.edu", "BCA201", FeedbackType::Endterm, [5.0, 5.0, 4.0], Some("Best course this term"), (4, 22)),
    ];
    let questions = ["Clarity of explanation", "Pace of coverage", "Availability for doubts"];

    for (email, code, feedback_type, ratings, remark, (month, day)) in submissions {
        let student_id = *student_ids.get(email).context("seed student missing")?;
        let subject_id = *subject_ids.get(code).context("seed subject missing")?;
        let submitted_at = Utc
            .with_ymd_and_hms(2026, month, day, 10, 0, 0)
            .single()
            .context("invalid seed date")?;
        let feedback_id =
            ensure_feedback(pool, student_id, subject_id, feedback_type, submitted_at).await?;

        let mut answers: Vec<Answer> = questions
            .iter()
            .zip(ratings)
            .map(|(question, rating)| Answer::rating(question, rating))
            .collect();
        if let Some(text) = remark {
            answers.push(Answer::comment("Additional remarks", text));
        }
        for (position, answer) in answers.iter().enumerate() {
            insert_answer(pool, feedback_id, position as i32, answer).await?;
        }
    }

    info!(
        students = students.len(),
        subjects = subjects.len(),
        "seed data inserted"
    );
    Ok(())
}

pub async fn fetch_feedback(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<FeedbackRecord>> {
    let headers = sqlx::query(
        r#"
        SELECT f.id, f.feedback_type, f.submitted_at,
               st.id AS student_id, st.full_name, st.email, st.roll_number, st.branch, st.year,
               su.id AS subject_id, su.code, su.name AS subject_name, su.instructor
        FROM course_feedback.feedback f
        JOIN course_feedback.students st ON st.id = f.student_id
        JOIN course_feedback.subjects su ON su.id = f.subject_id
        WHERE f.submitted_at >= $1
        ORDER BY f.submitted_at, f.id
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("failed to fetch feedback")?;

    let ids: Vec<Uuid> = headers.iter().map(|row| row.get("id")).collect();
    let answer_rows = sqlx::query(
        r#"
        SELECT feedback_id, question, kind, rating, comment
        FROM course_feedback.feedback_answers
        WHERE feedback_id = ANY($1)
        ORDER BY feedback_id, position
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await
    .context("failed to fetch feedback answers")?;

    let mut answers: HashMap<Uuid, Vec<Answer>> = HashMap::new();
    for row in answer_rows {
        let kind: String = row.get("kind");
        answers
            .entry(row.get("feedback_id"))
            .or_default()
            .push(Answer {
                question: row.get("question"),
                kind: kind.parse().unwrap_or(AnswerKind::Rating),
                rating: row.get("rating"),
                comment: row.get("comment"),
            });
    }

    let mut records = Vec::with_capacity(headers.len());
    for row in headers {
        let id: Uuid = row.get("id");
        let feedback_type: String = row.get("feedback_type");
        let feedback_type = match feedback_type.parse::<FeedbackType>() {
            Ok(kind) => kind,
            Err(err) => {
                warn!(%id, %err, "skipping feedback row");
                continue;
            }
        };
        let student_id: Uuid = row.get("student_id");
        let subject_id: Uuid = row.get("subject_id");
        let year: i16 = row.get("year");

        records.push(FeedbackRecord {
            student_id: student_id.to_string(),
            student_name: row.get("full_name"),
            student_email: row.get("email"),
            roll_number: row
                .get::<Option<String>, _>("roll_number")
                .unwrap_or_default(),
            branch: row.get("branch"),
            year: year.max(0) as u16,
            subject_id: subject_id.to_string(),
            subject_code: row.get("code"),
            subject_name: row.get("subject_name"),
            instructor: row.get("instructor"),
            feedback_type,
            answers: answers.remove(&id).unwrap_or_default(),
            submitted_at: row.get("submitted_at"),
        });
    }

    debug!(records = records.len(), %since, "fetched feedback");
    Ok(records)
}

pub async fn fetch_roster(pool: &PgPool) -> anyhow::Result<Vec<RosterEntry>> {
    let rows = sqlx::query(
        "SELECT full_name, email, roll_number, branch, year, role \
         FROM course_feedback.students ORDER BY roll_number NULLS LAST, email",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch roster")?;

    let mut roster = Vec::with_capacity(rows.len());
    for row in rows {
        let role: String = row.get("role");
        let year: i16 = row.get("year");
        roster.push(RosterEntry {
            name: row.get("full_name"),
            email: row.get("email"),
            roll_number: row
                .get::<Option<String>, _>("roll_number")
                .unwrap_or_default(),
            branch: row.get("branch"),
            year: year.max(0) as u16,
            role: role.parse().unwrap_or(Role::Student),
        });
    }
    Ok(roster)
}

pub async fn fetch_subjects(pool: &PgPool) -> anyhow::Result<Vec<SubjectInfo>> {
    let rows = sqlx::query(
        "SELECT code, name, instructor, branch, year FROM course_feedback.subjects ORDER BY code",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch subjects")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let year: i16 = row.get("year");
            SubjectInfo {
                code: row.get("code"),
                name: row.get("name"),
                instructor: row.get("instructor"),
                branch: row.get("branch"),
                year: year.max(0) as u16,
            }
        })
        .collect())
}

#[derive(Debug, serde::Deserialize)]
struct FeedbackCsvRow {
    roll_number: String,
    full_name: String,
    email: String,
    branch: String,
    year: u16,
    subject_code: String,
    subject_name: String,
    instructor: String,
    feedback_type: String,
    question_no: i32,
    question: String,
    #[serde(default)]
    answer_type: Option<String>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

impl FeedbackCsvRow {
    fn answer(&self) -> Answer {
        let kind = self
            .answer_type
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(AnswerKind::Rating);
        let comment = self
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let rating = match kind {
            AnswerKind::Rating => self
                .rating
                .as_deref()
                .map(ingest::parse_rating)
                .unwrap_or(0.0),
            AnswerKind::Comment => 0.0,
        };
        Answer {
            question: self.question.clone(),
            kind,
            rating,
            comment,
        }
    }
}

/// One CSV row per answer. Returns the number of answers inserted; rows
/// already present are left untouched.
pub async fn import_feedback_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;
    let mut students: HashMap<String, Uuid> = HashMap::new();
    let mut subjects: HashMap<String, Uuid> = HashMap::new();

    for (line, result) in reader.deserialize::<FeedbackCsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV row {}", line + 1))?;
        let feedback_type: FeedbackType = match row.feedback_type.parse() {
            Ok(kind) => kind,
            Err(err) => {
                warn!(row = line + 1, %err, "skipping CSV row");
                continue;
            }
        };

        let student_id = match students.get(&row.email) {
            Some(id) => *id,
            None => {
                let id = upsert_student(
                    pool,
                    &student(&row.roll_number, &row.full_name, &row.email, &row.branch, row.year),
                )
                .await?;
                students.insert(row.email.clone(), id);
                id
            }
        };
        let subject_id = match subjects.get(&row.subject_code) {
            Some(id) => *id,
            None => {
                let id = ensure_subject(
                    pool,
                    &subject(
                        &row.subject_code,
                        &row.subject_name,
                        &row.instructor,
                        &row.branch,
                        row.year,
                    ),
                )
                .await?;
                subjects.insert(row.subject_code.clone(), id);
                id
            }
        };

        let submitted_at = row.submitted_at.unwrap_or_else(Utc::now);
        let feedback_id =
            ensure_feedback(pool, student_id, subject_id, feedback_type, submitted_at).await?;
        if insert_answer(pool, feedback_id, row.question_no, &row.answer()).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[derive(Debug, serde::Deserialize)]
struct StudentRow {
    #[serde(default)]
    roll_number: String,
    full_name: String,
    email: String,
    branch: String,
    year: u16,
    #[serde(default)]
    role: Option<String>,
}

impl StudentRow {
    /// A blank role means a student.
    fn into_entry(self) -> Result<RosterEntry, ParseError> {
        let role = match self.role.as_deref().map(str::trim) {
            None | Some("") => Role::Student,
            Some(value) => value.parse()?,
        };
        Ok(RosterEntry {
            name: self.full_name,
            email: self.email,
            roll_number: self.roll_number,
            branch: self.branch,
            year: self.year,
            role,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct SubjectRow {
    code: String,
    name: String,
    instructor: String,
    branch: String,
    year: u16,
}

impl From<SubjectRow> for SubjectInfo {
    fn from(row: SubjectRow) -> Self {
        SubjectInfo {
            code: row.code,
            name: row.name,
            instructor: row.instructor,
            branch: row.branch,
            year: row.year,
        }
    }
}

/// Upserts roster students and, optionally, subjects so expected counts
/// include people who never submitted. Rows with an unknown role are
/// skipped.
pub async fn import_roster_csv(
    pool: &PgPool,
    students_csv: Option<&std::path::Path>,
    subjects_csv: Option<&std::path::Path>,
) -> anyhow::Result<(usize, usize)> {
    let mut student_count = 0usize;
    if let Some(path) = students_csv {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        for (line, result) in reader.deserialize::<StudentRow>().enumerate() {
            let row = result.with_context(|| format!("invalid roster row {}", line + 1))?;
            let entry = match row.into_entry() {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(row = line + 1, %err, "skipping roster row");
                    continue;
                }
            };
            upsert_student(pool, &entry).await?;
            student_count += 1;
        }
    }

    let mut subject_count = 0usize;
    if let Some(path) = subjects_csv {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        for (line, result) in reader.deserialize::<SubjectRow>().enumerate() {
            let row = result.with_context(|| format!("invalid subject row {}", line + 1))?;
            upsert_subject(pool, &row.into()).await?;
            subject_count += 1;
        }
    }

    Ok((student_count, subject_count))
}
