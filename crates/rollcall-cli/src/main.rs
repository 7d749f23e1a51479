use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use rollcall_core::{AttendanceEntry, Employee};
use rollcall_service::{Config, EmployeeFields, NewEmployee, Service, ServiceError};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall employee attendance tracker")]
struct Cli {
    /// Admin username for admin-only commands
    #[arg(long, global = true, env = "ROLLCALL_ADMIN_USER")]
    admin_user: Option<String>,
    /// Admin password for admin-only commands
    #[arg(long, global = true, env = "ROLLCALL_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new employee with a face capture
    Register {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        position: String,
        /// Image file, or a text file holding a data URL
        #[arg(long)]
        capture: PathBuf,
    },
    /// Check in by face capture, or by employee id (admin)
    Attend {
        /// Capture to recognize
        #[arg(required_unless_present = "employee")]
        capture: Option<PathBuf>,
        /// Mark this employee directly instead of recognizing a face
        #[arg(long, conflicts_with = "capture")]
        employee: Option<String>,
        /// Date for a manual entry (YYYY-MM-DD, default today)
        #[arg(long, requires = "employee")]
        date: Option<String>,
        /// Time for a manual entry (HH:MM, default now)
        #[arg(long, requires = "employee")]
        time: Option<String>,
    },
    /// Manage employees (admin)
    Employees {
        #[command(subcommand)]
        command: EmployeeCommands,
    },
    /// Manage attendance records (admin)
    Attendance {
        #[command(subcommand)]
        command: AttendanceCommands,
    },
    /// Presence today, this week and this month (admin)
    Stats,
    /// Presence per department (admin)
    Departments {
        /// Day to report (default today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Per-employee attendance summary (admin)
    Report {
        /// First day (default: first of this month)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day (default today)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Export attendance as CSV (admin)
    Export {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Output file, `-` for stdout (default: suggested file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the activity log (admin)
    Activity {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Admin accounts
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum EmployeeCommands {
    /// List all employees
    List,
    /// Show one employee
    Show { id: String },
    /// Edit an employee; omitted fields keep their value
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        position: Option<String>,
        /// Replace the face capture
        #[arg(long)]
        capture: Option<PathBuf>,
    },
    /// Delete an employee and their attendance history
    Delete { id: String },
    /// Print the stored face capture
    Face { id: String },
}

#[derive(Subcommand)]
enum AttendanceCommands {
    /// Today's check-ins
    Today,
    /// Check-ins in a date range
    List {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Mark an employee present on a chosen date
    Mark {
        employee: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// HH:MM
        #[arg(long)]
        time: String,
    },
    /// Delete an attendance record
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create the admin account or replace its password
    Reset {
        username: String,
        #[arg(long, env = "ROLLCALL_NEW_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Check admin credentials
    Login,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    tracing::debug!(backend = ?config.backend, db = %config.db_path().display(), "configuration loaded");

    // Storage and password hashing block; keep them off the runtime threads.
    let outcome = tokio::task::spawn_blocking(move || execute(cli, &config)).await?;

    if let Err(err) = outcome {
        if err.is_internal() {
            tracing::error!(error = %err, "command failed");
        }
        eprintln!("{}", err.user_message());
        std::process::exit(1);
    }
    Ok(())
}

fn execute(cli: Cli, config: &Config) -> Result<(), ServiceError> {
    run(cli, Service::open(config)?)
}

fn run(cli: Cli, service: Service) -> Result<(), ServiceError> {
    let json = cli.json;
    let admin = AdminCredentials {
        user: cli.admin_user,
        password: cli.admin_password,
    };

    let service = match cli.command {
        Commands::Register {
            id,
            name,
            department,
            position,
            capture,
        } => {
            let service = service.with_requester("cli");
            let employee = service.register(NewEmployee {
                employee_id: id,
                full_name: name,
                department,
                position,
                capture: read_capture(&capture)?,
            })?;
            println!(
                "Registered {} ({})",
                employee.full_name, employee.employee_id
            );
            service
        }

        Commands::Attend {
            capture: Some(capture),
            employee: None,
            ..
        } => {
            let service = service.with_requester("cli");
            let check_in = service.recognize_and_mark(&read_capture(&capture)?)?;
            if json {
                print_json(&check_in);
            } else {
                println!(
                    "Welcome, {}! Checked in at {} (matched by {}, score {:.2})",
                    check_in.recognized.full_name,
                    check_in.record.check_in.format("%H:%M"),
                    check_in.recognized.strategy,
                    check_in.recognized.score
                );
            }
            service
        }

        Commands::Attend {
            employee, date, time, ..
        } => {
            let service = admin.authorize(service)?;
            let employee_id = employee.unwrap_or_default();
            let record = if date.is_none() && time.is_none() {
                service.mark_attendance(&employee_id, None)?
            } else {
                let now = Local::now();
                let date = date.unwrap_or_else(|| now.format("%Y-%m-%d").to_string());
                let time = time.unwrap_or_else(|| now.format("%H:%M").to_string());
                service.mark_manual(&employee_id, &date, &time)?
            };
            println!(
                "Marked {} present at {} (record {})",
                record.employee_id,
                record.check_in.format("%Y-%m-%d %H:%M"),
                record.id
            );
            service
        }

        Commands::Employees { command } => {
            let service = admin.authorize(service)?;
            run_employees(&service, command, json)?;
            service
        }

        Commands::Attendance { command } => {
            let service = admin.authorize(service)?;
            run_attendance(&service, command, json)?;
            service
        }

        Commands::Stats => {
            let service = admin.authorize(service)?;
            let stats = service.stats()?;
            if json {
                print_json(&stats);
            } else {
                println!("Employees:  {}", stats.total_employees);
                for (label, window) in [
                    ("Today", stats.today),
                    ("This week", stats.week),
                    ("This month", stats.month),
                ] {
                    println!(
                        "{:<11} {} present ({:.1}%)",
                        format!("{label}:"),
                        window.present,
                        window.rate
                    );
                }
            }
            service
        }

        Commands::Departments { date } => {
            let service = admin.authorize(service)?;
            let date = date.unwrap_or_else(today);
            let rows = service.department_attendance(date)?;
            if json {
                print_json(&rows);
            } else {
                println!("{:<24} {:>8} {:>8}", "DEPARTMENT", "PRESENT", "TOTAL");
                for row in rows {
                    println!(
                        "{:<24} {:>8} {:>8}",
                        row.department, row.present, row.total_employees
                    );
                }
            }
            service
        }

        Commands::Report { from, to } => {
            let service = admin.authorize(service)?;
            let (from, to) = range_or_month(from, to);
            let rows = service.attendance_report(from, to)?;
            if json {
                print_json(&rows);
            } else {
                println!(
                    "{:<12} {:<24} {:<16} {:>5} {:>9}  {:<16}  {:<16}",
                    "ID", "NAME", "DEPARTMENT", "DAYS", "CHECK-INS", "FIRST", "LAST"
                );
                for row in rows {
                    println!(
                        "{:<12} {:<24} {:<16} {:>5} {:>9}  {:<16}  {:<16}",
                        row.employee_id,
                        row.full_name,
                        row.department,
                        row.days_present,
                        row.total_check_ins,
                        row.first_check_in
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "-".into()),
                        row.last_check_in
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "-".into()),
                    );
                }
            }
            service
        }

        Commands::Export { from, to, output } => {
            let service = admin.authorize(service)?;
            let (from, to) = range_or_month(from, to);
            let export = service.export_csv(from, to)?;
            match output {
                Some(path) if path == Path::new("-") => print!("{}", export.csv),
                other => {
                    let path = other.unwrap_or_else(|| PathBuf::from(&export.file_name));
                    std::fs::write(&path, &export.csv).map_err(|e| {
                        ServiceError::Validation(format!("Cannot write {}: {e}", path.display()))
                    })?;
                    println!("Wrote {}", path.display());
                }
            }
            service
        }

        Commands::Activity { limit } => {
            let service = admin.authorize(service)?;
            let entries = service.recent_activity(limit)?;
            if json {
                print_json(&entries);
            } else {
                for entry in entries {
                    println!(
                        "{}  {:<18} {:<10} {}",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.action,
                        entry.requester.as_deref().unwrap_or("-"),
                        entry.details
                    );
                }
            }
            service
        }

        Commands::Admin {
            command:
                AdminCommands::Reset {
                    username,
                    password,
                    email,
                },
        } => {
            let service = service.with_requester("cli");
            let account = service.reset_admin(&username, &password, &email)?;
            println!("Admin account {} updated", account.username);
            service
        }

        Commands::Admin {
            command: AdminCommands::Login,
        } => {
            let service = admin.authorize(service)?;
            println!("Credentials accepted");
            service
        }
    };

    service.shutdown();
    Ok(())
}

fn run_employees(
    service: &Service,
    command: EmployeeCommands,
    json: bool,
) -> Result<(), ServiceError> {
    match command {
        EmployeeCommands::List => {
            let employees = service.list_employees()?;
            if json {
                let rows: Vec<_> = employees.iter().map(employee_json).collect();
                print_json(&rows);
            } else {
                println!(
                    "{:<12} {:<24} {:<16} {:<16} {}",
                    "ID", "NAME", "DEPARTMENT", "POSITION", "REGISTERED"
                );
                for e in &employees {
                    print_employee_row(e);
                }
            }
        }
        EmployeeCommands::Show { id } => {
            let employee = service.get_employee(&id)?;
            if json {
                print_json(&employee_json(&employee));
            } else {
                println!("ID:          {}", employee.employee_id);
                println!("Name:        {}", employee.full_name);
                println!("Department:  {}", employee.department);
                println!("Position:    {}", employee.position);
                println!(
                    "Registered:  {}",
                    employee.registration_date.format("%Y-%m-%d %H:%M")
                );
                println!(
                    "Face:        {}",
                    if employee.face_data.is_some() { "enrolled" } else { "none" }
                );
            }
        }
        EmployeeCommands::Edit {
            id,
            name,
            department,
            position,
            capture,
        } => {
            let current = service.get_employee(&id)?;
            let fields = EmployeeFields {
                full_name: name.unwrap_or(current.full_name),
                department: department.unwrap_or(current.department),
                position: position.unwrap_or(current.position),
            };
            let capture = capture.as_deref().map(read_capture).transpose()?;
            let employee = service.update_employee(&id, &fields, capture.as_deref())?;
            println!("Updated {} ({})", employee.full_name, employee.employee_id);
        }
        EmployeeCommands::Delete { id } => {
            let removed = service.delete_employee(&id)?;
            println!("Deleted {id} and {removed} attendance records");
        }
        EmployeeCommands::Face { id } => {
            println!("{}", service.face_image(&id)?);
        }
    }
    Ok(())
}

fn run_attendance(
    service: &Service,
    command: AttendanceCommands,
    json: bool,
) -> Result<(), ServiceError> {
    let entries = match command {
        AttendanceCommands::Today => service.todays_attendance()?,
        AttendanceCommands::List { from, to } => service.attendance_between(from, to)?,
        AttendanceCommands::Mark {
            employee,
            date,
            time,
        } => {
            let record = service.mark_manual(&employee, &date, &time)?;
            println!(
                "Marked {} present at {} (record {})",
                record.employee_id,
                record.check_in.format("%Y-%m-%d %H:%M"),
                record.id
            );
            return Ok(());
        }
        AttendanceCommands::Delete { id } => {
            let record = service.delete_attendance_record(id)?;
            println!(
                "Deleted record {} ({} on {})",
                record.id,
                record.employee_id,
                record.date()
            );
            return Ok(());
        }
    };

    if json {
        print_json(&entries);
    } else {
        print_attendance(&entries);
    }
    Ok(())
}

struct AdminCredentials {
    user: Option<String>,
    password: Option<String>,
}

impl AdminCredentials {
    /// Log in and attribute subsequent activity to the admin.
    fn authorize(&self, service: Service) -> Result<Service, ServiceError> {
        let (Some(user), Some(password)) = (&self.user, &self.password) else {
            return Err(ServiceError::Validation(
                "This command requires --admin-user and --admin-password.".into(),
            ));
        };
        let admin = service.login(user, password)?;
        Ok(service.with_requester(admin.username))
    }
}

/// Read a capture file: text files are taken as a data URL or base64,
/// anything else is wrapped as a base64 data URL.
fn read_capture(path: &Path) -> Result<String, ServiceError> {
    let bytes = std::fs::read(path).map_err(|e| {
        ServiceError::Validation(format!("Cannot read capture {}: {e}", path.display()))
    })?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text.trim().to_string()),
        Err(e) => Ok(format!(
            "data:image/*;base64,{}",
            STANDARD.encode(e.into_bytes())
        )),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Explicit bounds, defaulting to the current month up to today.
fn range_or_month(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
    let today = today();
    let month_start = today.with_day(1).unwrap_or(today);
    (from.unwrap_or(month_start), to.unwrap_or(today))
}

fn employee_json(e: &Employee) -> serde_json::Value {
    serde_json::json!({
        "employee_id": e.employee_id,
        "full_name": e.full_name,
        "department": e.department,
        "position": e.position,
        "registration_date": e.registration_date,
        "has_face": e.face_data.is_some(),
    })
}

fn print_employee_row(e: &Employee) {
    println!(
        "{:<12} {:<24} {:<16} {:<16} {}",
        e.employee_id,
        e.full_name,
        e.department,
        e.position,
        e.registration_date.format("%Y-%m-%d")
    );
}

fn print_attendance(entries: &[AttendanceEntry]) {
    if entries.is_empty() {
        println!("No attendance records");
        return;
    }
    println!(
        "{:>6}  {:<12} {:<24} {:<16} {:<16}",
        "RECORD", "ID", "NAME", "DEPARTMENT", "CHECK-IN"
    );
    for e in entries {
        println!(
            "{:>6}  {:<12} {:<24} {:<16} {:<16}",
            e.record.id,
            e.record.employee_id,
            e.full_name,
            e.department,
            e.record.check_in.format("%Y-%m-%d %H:%M")
        );
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to encode output: {e}"),
    }
}
