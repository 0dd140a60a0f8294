use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use exam_portal_client::api::models::{ContactInfo, SendMessagePayload};
use exam_portal_client::api::routes::Service;
use exam_portal_client::api::services::{
    AuthService, ChatApi, CourseService, ExamService, FeedbackService, MaterialService, PaymentService,
    QuestionBankService, ReportService,
};
use exam_portal_client::api::ApiClient;
use exam_portal_client::app::Settings;
use exam_portal_client::chat::{ChatClient, MessageBus, SignalRConnector};
use exam_portal_client::devtools::{AiProvider, AiSmoke};
use exam_portal_client::api::error::FORBIDDEN_MESSAGE;
use exam_portal_client::pages::admin::{table_page, AdminDashboard, Searchable, DEFAULT_PAGE_SIZE};
use exam_portal_client::pages::lesson::StudyLessonController;
use exam_portal_client::pages::payment::{PaymentController, PaymentForm, PaymentOutcome, PaymentResult};
use exam_portal_client::pages::{Notice, ViewState};
use exam_portal_client::storage::Store;
use exam_portal_client::utils::RUNTIME;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "exam-portal", version, about = "Command-line client for the exam and course portal")]
struct Cli {
    /// Settings file (TOML); defaults to the platform config directory
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the current profile
    Me,
    /// Exchange the refresh token for a new token pair
    Refresh,
    Courses,
    /// Open a lesson of a course (first lesson when omitted)
    Lesson { course_id: i64, lesson_id: Option<i64> },
    /// Enroll in a course, paying through PayOS when it is not free
    Pay {
        course_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Handle the query string PayOS appended to the return or cancel URL
    PaymentReturn { query: String },
    /// Cancel the checkout started by the last `pay`
    PaymentCancel,
    Exams(TableArgs),
    Questions {
        #[arg(long)]
        subject: Option<String>,
        #[command(flatten)]
        table: TableArgs,
    },
    Feedback(TableArgs),
    /// Send feedback about the platform
    FeedbackSubmit {
        content: String,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,
    },
    Reports(TableArgs),
    Enrollments {
        #[arg(long)]
        course: Option<i64>,
        #[command(flatten)]
        table: TableArgs,
    },
    #[command(subcommand)]
    Chat(ChatCommand),
    /// Generate sample questions with an AI provider and validate them
    AiSmoke {
        #[arg(long, value_enum, default_value = "gemini")]
        provider: AiProvider,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = "Toán")]
        subject: String,
        #[arg(long, default_value_t = 3)]
        count: usize,
    },
    /// Print the effective settings, optionally writing them back
    Config {
        #[arg(long)]
        save: bool,
    },
}

/// Search box and pager of the admin tables.
#[derive(Args)]
struct TableArgs {
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long, default_value_t = 1)]
    page: usize,
}

#[derive(Subcommand)]
enum ChatCommand {
    Rooms,
    History {
        room: i64,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Send { room: i64, text: String },
    /// Find or create the support room
    Support,
    /// Print messages pushed by the hub
    Listen {
        rooms: Vec<i64>,
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
}

struct Session {
    settings: Settings,
    store: Arc<Store>,
    api: Arc<ApiClient>,
}

impl Session {
    fn open(settings: Settings) -> Result<Self, Box<dyn Error>> {
        let store = Arc::new(Store::open_default(settings.cache.clone())?);
        let api = Arc::new(ApiClient::new(&settings, store.clone())?);
        Ok(Self { settings, store, api })
    }

    fn auth(&self) -> AuthService {
        AuthService::new(self.api.clone())
    }

    fn courses(&self) -> CourseService {
        CourseService::new(self.api.clone())
    }

    fn admin(&self) -> AdminDashboard {
        AdminDashboard::new(
            ExamService::new(self.api.clone()),
            QuestionBankService::new(self.api.clone()),
            self.courses(),
            FeedbackService::new(self.api.clone()),
            ReportService::new(self.api.clone()),
        )
    }

    fn chat(&self) -> ChatClient {
        let connector = Arc::new(SignalRConnector::new(self.settings.hub_url.clone()));
        ChatClient::new(ChatApi::new(self.api.clone()), self.store.clone(), connector, MessageBus::new())
    }

    /// Admin tables are for admins and teachers; an unknown role is left to the backend.
    fn require_staff(&self) -> CliResult {
        match self.auth().cached_profile() {
            Some(p) if !(p.is_admin() || p.is_teacher()) => Err(FORBIDDEN_MESSAGE.into()),
            _ => Ok(()),
        }
    }

    fn payments(&self) -> PaymentController {
        PaymentController::new(
            self.courses(),
            PaymentService::new(self.api.clone()),
            self.store.clone(),
            &self.settings.site_origin,
        )
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref());

    match RUNTIME.block_on(run(cli.command, settings, cli.config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings: Settings, config_path: Option<PathBuf>) -> CliResult {
    match command {
        Command::Config { save } => {
            println!("{}", toml::to_string_pretty(&settings)?);
            if save {
                settings.save(config_path.as_deref())?;
            }
            Ok(())
        }
        Command::AiSmoke { provider, model, subject, count } => {
            let report = AiSmoke::from_env(provider, model)?.run(&subject, count).await?;
            for q in &report.accepted {
                println!("ok   {}", q.content);
            }
            for (q, why) in &report.rejected {
                println!("FAIL {} ({why})", q.content);
            }
            if report.passed() { Ok(()) } else { Err("generated questions failed validation".into()) }
        }
        command => run_session(command, Session::open(settings)?).await,
    }
}

async fn run_session(command: Command, session: Session) -> CliResult {
    match command {
        Command::Login { email, password } => {
            let profile = session.auth().login(&email, &password).await?;
            println!("Logged in as {} <{}> ({})", profile.full_name, profile.email, profile.role);
        }
        Command::Logout => {
            session.auth().logout().await;
            println!("Logged out");
        }
        Command::Me => {
            let profile = session.auth().current_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Refresh => {
            session.auth().refresh().await?;
            println!("Session refreshed");
        }
        Command::Courses => {
            for c in session.courses().list().await? {
                let price = if c.is_free || c.price <= 0.0 { "free".to_string() } else { format!("{:.0} VND", c.price) };
                println!("{:>5}  {}  [{price}]", c.id, c.title);
            }
        }
        Command::Lesson { course_id, lesson_id } => {
            let media_base = session
                .settings
                .services
                .base_for(Service::Courses)
                .unwrap_or(session.settings.gateway_base.as_str())
                .to_string();
            let controller = StudyLessonController::new(
                session.courses(),
                MaterialService::new(session.api.clone()),
                &media_base,
            );
            let view = unwrap_view(controller.open(course_id, lesson_id).await)?;
            println!("{} / {}", view.course.title, view.current.title);
            match view.video.playable_url() {
                Some(url) => println!("video: {url}"),
                None => println!("video: none"),
            }
            match &view.materials {
                ViewState::Ready(items) => {
                    for m in items {
                        println!("  - {} {}", m.title, m.file_url);
                    }
                }
                other => println!("materials: {}", view_message(other)),
            }
            if let Some(next) = view.next_lesson_id {
                println!("next lesson: {next}");
            }
        }
        Command::Pay { course_id, name, email, phone, address } => {
            let course = session.courses().get(course_id).await?;
            let profile = session.auth().cached_profile();
            let mut form = PaymentForm::for_course(&course, profile.as_ref());
            override_contact(&mut form.contact, name, email, phone, address);
            match session.payments().submit(&form).await.map_err(notice_error)? {
                PaymentOutcome::Enrolled { already: true } => println!("Already enrolled in {}", course.title),
                PaymentOutcome::Enrolled { already: false } => println!("Enrolled in {}", course.title),
                PaymentOutcome::Redirect { checkout_url, order_code } => {
                    println!("Order {order_code}: open {checkout_url} to pay");
                }
            }
        }
        Command::PaymentReturn { query } => {
            match session.payments().handle_return(&query).await.map_err(notice_error)? {
                PaymentResult::Paid { order_code } => println!("Order {order_code} paid"),
                PaymentResult::Cancelled { order_code } => println!("Order {order_code} cancelled"),
                PaymentResult::Pending { order_code } => println!("Order {order_code} still pending"),
            }
        }
        Command::PaymentCancel => {
            let order_code = session.payments().cancel_pending().await.map_err(notice_error)?;
            println!("Order {order_code} cancelled");
        }
        Command::FeedbackSubmit { content, rating } => {
            if content.trim().is_empty() {
                return Err("feedback content is empty".into());
            }
            FeedbackService::new(session.api.clone()).submit(&content, rating).await?;
            println!("Feedback sent");
        }
        Command::Exams(table) => {
            session.require_staff()?;
            let exams = unwrap_view(session.admin().load_exams().await)?;
            print_table(&exams, &table, |e| format!("{:>5}  {}  ({} min)", e.id, e.title, e.duration_minutes));
        }
        Command::Questions { subject, table } => {
            session.require_staff()?;
            let questions = unwrap_view(session.admin().load_questions(subject.as_deref()).await)?;
            print_table(&questions, &table, |q| format!("{:>5}  {}", q.id, q.content));
        }
        Command::Feedback(table) => {
            session.require_staff()?;
            let feedback = unwrap_view(session.admin().load_feedback().await)?;
            print_table(&feedback, &table, |f| {
                format!("{:>5}  {}  [{}]", f.id, f.content, f.status.as_deref().unwrap_or_default())
            });
        }
        Command::Reports(table) => {
            session.require_staff()?;
            let reports = unwrap_view(session.admin().load_reports().await)?;
            print_table(&reports, &table, |r| {
                format!("{:>5}  {}  [{}]", r.id, r.reason, r.status.as_deref().unwrap_or_default())
            });
        }
        Command::Enrollments { course, table } => {
            session.require_staff()?;
            let enrollments = unwrap_view(session.admin().load_enrollments(course).await)?;
            print_table(&enrollments, &table, |e| {
                format!(
                    "{:>5}  {}  {}",
                    e.id,
                    e.user_name.as_deref().unwrap_or_default(),
                    e.course_title.clone().unwrap_or_else(|| e.course_id.to_string())
                )
            });
        }
        Command::Chat(chat) => run_chat(chat, session.chat()).await?,
        Command::Config { .. } | Command::AiSmoke { .. } => return Err("command runs without a session".into()),
    }
    Ok(())
}

async fn run_chat(command: ChatCommand, chat: ChatClient) -> CliResult {
    match command {
        ChatCommand::Rooms => {
            for room in chat.rooms_api().rooms().await? {
                println!("{:>5}  {:?}  {}", room.id, room.room_type, room.name.unwrap_or_default());
            }
        }
        ChatCommand::History { room, page } => {
            let sync = chat.sync_history(room, page).await;
            for m in &sync.messages {
                print_message(m);
            }
            if let Some(e) = sync.error {
                eprintln!("(showing cached messages: {})", e.user_message());
            }
        }
        ChatCommand::Send { room, text } => {
            let sent = chat.send_message(room, &SendMessagePayload::text(text)).await?;
            print_message(&sent);
        }
        ChatCommand::Support => {
            let room = chat.ensure_support_room().await?;
            println!("Support room {}", room.id);
        }
        ChatCommand::Listen { rooms, seconds } => {
            let _printer = chat.on_message_received(print_message);
            chat.connect().await;
            for room in rooms {
                chat.join_room(room);
            }
            log::info!("Listening for chat messages ({:?})", chat.state());
            let mut events = chat.bus().events();
            let wait = async {
                loop {
                    match events.recv().await {
                        Ok(event) => log::debug!("hub event: {event:?}"),
                        Err(RecvError::Lagged(skipped)) => log::debug!("skipped {skipped} hub events"),
                        Err(RecvError::Closed) => break,
                    }
                }
            };
            match seconds {
                Some(s) => {
                    let _ = tokio::time::timeout(Duration::from_secs(s), wait).await;
                }
                None => wait.await,
            }
            chat.disconnect();
        }
    }
    Ok(())
}

fn print_message(m: &exam_portal_client::api::models::ChatMessage) {
    let at = m.sent_at.map(|t| t.format("%H:%M").to_string()).unwrap_or_default();
    let who = m.sender_name.as_deref().unwrap_or(m.sender_id.as_str());
    println!("[{}] {at} {who}: {}", m.room_id, m.content);
}

fn print_table<T: Searchable>(items: &[T], args: &TableArgs, row: impl Fn(&T) -> String) {
    let page = table_page(items, &args.search, args.page, DEFAULT_PAGE_SIZE);
    for item in page.rows.iter().copied() {
        println!("{}", row(item));
    }
    println!("page {}/{} ({} rows)", page.page, page.total_pages, page.total_rows);
}

fn override_contact(
    contact: &mut ContactInfo,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
) {
    if let Some(v) = name {
        contact.full_name = v;
    }
    if let Some(v) = email {
        contact.email = v;
    }
    if let Some(v) = phone {
        contact.phone_number = v;
    }
    if let Some(v) = address {
        contact.address = v;
    }
}

fn unwrap_view<T>(state: ViewState<T>) -> Result<T, Box<dyn Error>> {
    match state {
        ViewState::Ready(v) => Ok(v),
        other => Err(view_message(&other).into()),
    }
}

fn view_message<T>(state: &ViewState<T>) -> String {
    match state {
        ViewState::Loading => "loading".into(),
        ViewState::Ready(_) => "ready".into(),
        ViewState::Failed { message } => message.clone(),
        ViewState::NotFound(message) => message.clone(),
    }
}

fn notice_error(notice: Notice) -> Box<dyn Error> {
    notice.text.into()
}
