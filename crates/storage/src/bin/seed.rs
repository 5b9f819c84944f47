use std::fmt;

use chrono::{DateTime, Utc};
use lms_core::model::{
    Badge, BadgeId, Course, CourseId, Lecture, LectureId, Question, QuestionId, Quiz, QuizId,
    SequenceItem,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_title: String,
    lectures: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidLectures { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidLectures { raw } => write!(f, "invalid --lectures value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("LMS_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut course_title =
            std::env::var("LMS_COURSE_TITLE").unwrap_or_else(|_| "Intro to Web Development".into());
        let mut lectures = std::env::var("LMS_LECTURES")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(4);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-title" => {
                    course_title = require_value(&mut args, "--course-title")?;
                }
                "--lectures" => {
                    let value = require_value(&mut args, "--lectures")?;
                    lectures = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLectures { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_title,
            lectures,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --course-title <title>    Demo course title (default: Intro to Web Development)");
    eprintln!("  --lectures <n>            Number of demo lectures (default: 4)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  LMS_DB_URL, LMS_COURSE_TITLE, LMS_LECTURES");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let mut course = Course::new(CourseId::generate(), args.course_title.clone())?;

    let topics = [
        ("HTML building blocks", "Elements, attributes, and structure"),
        ("Styling with CSS", "Selectors, the cascade, and layout"),
        ("JavaScript basics", "Values, functions, and the DOM"),
        ("Shipping a page", "Hosting, bundling, and performance"),
    ];
    let mut sequence = Vec::new();
    for i in 0..args.lectures {
        let (name, description) = topics[(i as usize) % topics.len()];
        let lecture = Lecture::new(
            LectureId::generate(),
            format!("{} ({})", name, i + 1),
            Some(description.to_owned()),
        )?;
        sequence.push(SequenceItem::Video {
            content_id: lecture.id(),
        });
        course.add_lecture(lecture);
    }

    let quiz = Quiz::new(
        QuizId::generate(),
        "Checkpoint quiz",
        Some("Covers the demo lectures".to_owned()),
        vec![
            Question::new(
                QuestionId::generate(),
                "Which tag defines a hyperlink?",
                vec!["<a>".to_owned(), "<link>".to_owned(), "<href>".to_owned()],
                "<a>",
                5,
            )?,
            Question::new(
                QuestionId::generate(),
                "Which language styles a page?",
                vec!["CSS".to_owned(), "SQL".to_owned()],
                "CSS",
                5,
            )?,
        ],
    )?;
    sequence.push(SequenceItem::Quiz {
        content_id: quiz.id(),
    });
    course.add_quiz(quiz);
    course.set_sequence(sequence);

    storage.catalog.upsert_course(&course).await?;

    let badge_specs = [("Bronze", "Earn your first XP", 10), ("Silver", "Keep going", 50), ("Gold", "Course crusher", 200)];
    for (title, content, threshold) in badge_specs {
        let badge = Badge::new(BadgeId::generate(), title, content, threshold, None, now)?;
        storage.badges.upsert_badge(&badge).await?;
    }

    println!(
        "Seeded course {} ({} lectures, 1 quiz) and {} badges into {}",
        course.id(),
        args.lectures,
        badge_specs.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
