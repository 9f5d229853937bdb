//! atelier: marketplace CLI client
//!
//! Thin command-line front end over the `atelier` library.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use atelier::negotiation::{NegotiationAction, latest};
use atelier::session::{Role, Session, SessionUser};
use atelier::types::{ArtisanJobsQuery, ArtisanQuery, JobListing, NewJobListing};
use atelier::{Config, FetchMode, Marketplace, UpdateOutcome};

/// Artisan marketplace CLI
#[derive(Parser)]
#[command(name = "atelier")]
#[command(version = atelier::PKG_VERSION)]
#[command(about = "Artisan marketplace client")]
struct Args {
    /// Config file (default: ~/.atelier/config.toml, then /etc/atelier/config.toml)
    #[arg(short, long, env = "ATELIER_CONFIG")]
    config: Option<PathBuf>,

    /// Bypass fresh cached values
    #[arg(long, global = true)]
    refresh: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a session token
    Login {
        /// Bearer token (or omit to read from stdin)
        token: Option<String>,
        /// User id the token belongs to
        #[arg(long)]
        user_id: String,
        /// customer, artisan, or admin
        #[arg(long, default_value = "customer")]
        role: Role,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Discover artisans
    Artisans {
        #[arg(long)]
        category: Option<String>,
        /// Subcategory id (repeatable)
        #[arg(long = "subcategory")]
        subcategories: Vec<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Only artisans currently taking work
        #[arg(long)]
        available: bool,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Show one artisan's profile
    Artisan {
        id: String,
    },

    /// Show or change your availability (artisans)
    Availability {
        /// "on" or "off"; omit to show the current value
        state: Option<String>,
    },

    /// List your job listings
    Jobs,

    /// Show one job listing
    Job {
        id: String,
    },

    /// Post a job listing
    PostJob {
        title: String,
        /// Description (or omit to read from stdin)
        description: Option<String>,
        #[arg(long)]
        budget: f64,
        /// Subcategory id (repeatable)
        #[arg(long = "subcategory", required = true)]
        subcategories: Vec<String>,
        #[arg(long)]
        location: Option<String>,
    },

    /// Delete a job listing
    DeleteJob {
        id: String,
    },

    /// List categories, or the subcategories of the given categories
    Categories {
        /// Category ids whose subcategories to list
        ids: Vec<String>,
    },

    /// List your proposals (artisans), or those for a listing (customers)
    Proposals {
        #[arg(long)]
        listing: Option<String>,
    },

    /// Show a proposal's negotiation history
    Negotiations {
        proposal: String,
    },

    /// Respond to the latest offer on a proposal
    Negotiate {
        proposal: String,
        /// accept, reject, or counter
        action: String,
        /// Amount for a counter-offer
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        message: Option<String>,
    },

    /// Jobs open to you (artisans)
    AvailableJobs {
        /// Subcategory id (repeatable)
        #[arg(long = "subcategory")]
        subcategories: Vec<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;
    let market = Marketplace::from_config(&config)?;
    market.session().restore().await?;
    let mode = FetchMode::from_force(args.refresh);

    match args.command {
        Command::Login {
            token,
            user_id,
            role,
            name,
        } => {
            let token = resolve_text(token, "login")?;
            let user = SessionUser {
                id: user_id,
                role,
                name,
            };
            market.login(Session::new(token, user)).await?;
            println!("signed in; session saved to {}", config.session_path().display());
        }

        Command::Logout => {
            market.logout().await?;
            println!("signed out");
        }

        Command::Whoami => match market.session().current() {
            Some(session) => {
                let user = session.user;
                match user.name {
                    Some(name) => println!("{name} ({}, {})", user.id, user.role),
                    None => println!("{} ({})", user.id, user.role),
                }
            }
            None => println!("not signed in"),
        },

        Command::Artisans {
            category,
            subcategories,
            location,
            search,
            available,
            page,
        } => {
            let mut query = ArtisanQuery::new()
                .subcategories(subcategories)
                .available_only(available)
                .page(page, 20);
            if let Some(c) = category {
                query = query.category(c);
            }
            if let Some(l) = location {
                query = query.location(l);
            }
            if let Some(s) = search {
                query = query.search(s);
            }
            let artisans = market.artisans().discover(&query, mode).await?;
            if artisans.is_empty() {
                println!("no artisans found");
            }
            for a in artisans.iter() {
                let status = if a.is_available { "available" } else { "busy" };
                let rating = a
                    .rating
                    .map(|r| format!("{r:.1}★ ({})", a.review_count))
                    .unwrap_or_else(|| "unrated".to_string());
                println!(
                    "{}  {}  {}  {}  {status}",
                    a.id,
                    a.name,
                    a.location.as_deref().unwrap_or("-"),
                    rating
                );
            }
        }

        Command::Artisan { id } => {
            let artisan = market.artisans().get(&id, mode).await?;
            let s = &artisan.summary;
            println!("id:         {}", s.id);
            println!("name:       {}", s.name);
            if let Some(ref headline) = s.headline {
                println!("headline:   {headline}");
            }
            if let Some(ref location) = s.location {
                println!("location:   {location}");
            }
            if let Some(rate) = s.hourly_rate {
                println!("rate:       {rate}/h");
            }
            println!("available:  {}", s.is_available);
            if !s.skills.is_empty() {
                println!("skills:     {}", s.skills.join(", "));
            }
            if let Some(ref bio) = artisan.bio {
                println!("\n{bio}");
            }
            if !artisan.reviews.is_empty() {
                println!("\nreviews:");
                for r in &artisan.reviews {
                    println!(
                        "  {:.1}  {}: {}",
                        r.rating,
                        r.reviewer_name.as_deref().unwrap_or("anonymous"),
                        r.comment.as_deref().unwrap_or("")
                    );
                }
            }
        }

        Command::Availability { state } => {
            let user = market.session().require_user()?;
            market.artisans().get(&user.id, mode).await?;
            let Some(state) = state else {
                println!("available: {}", market.artisans().availability().get());
                return Ok(());
            };
            let wanted = match state.as_str() {
                "on" | "true" | "yes" => true,
                "off" | "false" | "no" => false,
                other => return Err(format!("availability: expected on/off, got {other:?}").into()),
            };
            match market.artisans().set_availability(wanted).await? {
                UpdateOutcome::Confirmed(v) => println!("available: {v}"),
                UpdateOutcome::RolledBack { restored, error } => {
                    return Err(format!("not changed (still {restored}): {error}").into());
                }
                UpdateOutcome::Dropped => println!("another change is still pending"),
            }
        }

        Command::Jobs => {
            let listings = market.listings().list(mode).await?;
            if listings.is_empty() {
                println!("no job listings");
            }
            for l in listings.iter() {
                print_listing_line(l);
            }
        }

        Command::Job { id } => {
            let l = market.listings().get(&id, mode).await?;
            println!("id:          {}", l.id);
            println!("title:       {}", l.title);
            println!("status:      {:?}", l.status);
            if let Some(budget) = l.budget {
                println!("budget:      {budget}");
            }
            if let Some(ref location) = l.location {
                println!("location:    {location}");
            }
            println!("proposals:   {}", l.proposal_count);
            if let Some(created) = l.created_at {
                println!("posted:      {}", created.format("%Y-%m-%d %H:%M"));
            }
            println!("\n{}", l.description);
        }

        Command::PostJob {
            title,
            description,
            budget,
            subcategories,
            location,
        } => {
            let description = resolve_text(description, "post-job")?;
            let mut listing = NewJobListing::new(title, description, budget).subcategories(subcategories);
            if let Some(l) = location {
                listing = listing.location(l);
            }
            let created = market.listings().create(&listing).await?;
            println!("posted {}", created.id);
        }

        Command::DeleteJob { id } => {
            market.listings().delete(&id).await?;
            println!("deleted {id}");
        }

        Command::Categories { ids } => {
            if ids.is_empty() {
                for c in market.listings().categories(mode).await?.iter() {
                    println!("{}  {}", c.id, c.name);
                }
            } else {
                for s in market.listings().subcategories(&ids, mode).await?.iter() {
                    println!("{}  {}  (category {})", s.id, s.name, s.category_id);
                }
            }
        }

        Command::Proposals { listing } => {
            let proposals = match listing {
                Some(id) => market.proposals().for_listing(&id, mode).await?,
                None => market.proposals().artisan_proposals(mode).await?,
            };
            if proposals.is_empty() {
                println!("no proposals");
            }
            for p in proposals.iter() {
                println!(
                    "{}  listing {}  {}  {:?}  {}",
                    p.id,
                    p.job_listing_id,
                    p.amount,
                    p.status,
                    p.job_title.as_deref().or(p.artisan_name.as_deref()).unwrap_or("")
                );
            }
        }

        Command::Negotiations { proposal } => {
            let history = market.proposals().negotiations(&proposal, mode).await?;
            if history.is_empty() {
                println!("no offers yet");
            }
            for e in history.iter() {
                let sender = e
                    .sender_id
                    .clone()
                    .or_else(|| e.sender_role.map(|r| r.to_string()))
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{}  {sender}  {}  {}",
                    e.created_at.format("%Y-%m-%d %H:%M"),
                    e.amount,
                    e.message.as_deref().unwrap_or("")
                );
            }
            if latest(&history).is_some() {
                let turn = market.proposals().can_respond(&proposal).await?;
                println!("\n{}", if turn { "your turn" } else { "waiting for the other party" });
            }
        }

        Command::Negotiate {
            proposal,
            action,
            amount,
            message,
        } => {
            let action = match (action.as_str(), amount) {
                ("accept", _) => NegotiationAction::Accept,
                ("reject", _) => NegotiationAction::Reject,
                ("counter", Some(amount)) => NegotiationAction::Counter { amount, message },
                ("counter", None) => return Err("negotiate: counter requires --amount".into()),
                (other, _) => {
                    return Err(format!("negotiate: expected accept/reject/counter, got {other:?}").into());
                }
            };
            market.proposals().negotiate(&proposal, action).await?;
            println!("sent");
        }

        Command::AvailableJobs {
            subcategories,
            location,
            page,
        } => {
            let mut query = ArtisanJobsQuery::new()
                .subcategories(subcategories)
                .page(page, 20);
            if let Some(l) = location {
                query = query.location(l);
            }
            let jobs = if args.refresh {
                market.artisan_jobs().refresh(&query).await?
            } else {
                market.artisan_jobs().available(&query).await?
            };
            if jobs.is_empty() {
                println!("no jobs available");
            }
            for l in jobs.iter() {
                print_listing_line(l);
            }
        }
    }

    Ok(())
}

fn print_listing_line(l: &JobListing) {
    println!(
        "{}  {}  {}  {:?}  {} proposals",
        l.id,
        l.title,
        l.budget.map(|b| b.to_string()).unwrap_or_else(|| "-".into()),
        l.status,
        l.proposal_count
    );
}

/// Resolve text input from an optional CLI argument or stdin.
///
/// The argument wins when both are present.
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(a) = arg {
        return Ok(a);
    }
    if !io::stdin().is_terminal() {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    Err(format!("{command}: no input provided (pass it as an argument or via stdin)").into())
}
