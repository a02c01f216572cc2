use anyhow::Result;
use clap::{Parser, Subcommand};
use trophycase::app::LoadingStatus;
use trophycase::{App, Config};

#[derive(Parser)]
#[command(name = "trophycase")]
#[command(
    author,
    version = "0.1.0",
    about = "A CLI achievement tracker for your personal game library"
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage library games
    Game {
        #[command(subcommand)]
        action: GameCommands,
    },

    /// Manually lock or unlock achievements
    Achievement {
        #[command(subcommand)]
        action: AchievementCommands,
    },

    /// Merge the remote snapshot into the library
    Sync {
        /// Also add owned games missing from the library
        #[arg(long)]
        discover: bool,
    },

    /// Watch a running game for live unlocks
    Watch {
        /// Library game id
        game_id: i64,
    },

    /// Manage the signed-in Steam account
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Manage the display language
    Lang {
        #[command(subcommand)]
        action: LangCommands,
    },
}

#[derive(Subcommand)]
enum GameCommands {
    /// List library games with unlock progress
    List,

    /// Add a game by store search, or a local-only entry
    Add {
        /// Game name to search for
        name: String,

        /// Path to the game executable
        #[arg(long)]
        exe: Option<String>,

        /// Add as a local-only entry with no remote counterpart
        #[arg(long)]
        local: bool,
    },

    /// Remove games and their achievements by id
    Remove {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Set the executable path for a game
    SetExe { id: i64, path: String },
}

#[derive(Subcommand)]
enum AchievementCommands {
    /// Mark an achievement unlocked now
    Unlock { game_id: i64, achievement_id: String },

    /// Relock an achievement
    Lock { game_id: i64, achievement_id: String },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Sign in with a Steam account id
    Login { steam_id: String },

    /// Sign out of the current account
    Logout,

    /// Show the signed-in account
    Show,
}

#[derive(Subcommand)]
enum LangCommands {
    /// Select the locale used for achievement text
    Set { code: String },

    /// Show the selected locale
    Show,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    // Load configuration
    let config = Config::load().await?;

    // Initialize the app; migrations run to completion inside load
    // before anything else can touch the store.
    let mut app = App::load(config, |status| {
        let label = match status {
            LoadingStatus::OpeningDatabase => "Opening database...",
            LoadingStatus::LoadingLibrary => "Loading library...",
            LoadingStatus::SyncingRemote => "Syncing with Steam...",
            LoadingStatus::Ready => return,
        };
        tracing::info!("{label}");
    })?;

    match cli.command {
        Commands::Game { action } => match action {
            GameCommands::List => app.cmd_game_list().await?,
            GameCommands::Add { name, exe, local } => {
                app.cmd_game_add(&name, exe.as_deref(), local).await?
            }
            GameCommands::Remove { ids } => app.cmd_game_remove(&ids).await?,
            GameCommands::SetExe { id, path } => app.cmd_game_set_exe(id, &path).await?,
        },
        Commands::Achievement { action } => match action {
            AchievementCommands::Unlock {
                game_id,
                achievement_id,
            } => app.cmd_achievement_set(game_id, &achievement_id, true).await?,
            AchievementCommands::Lock {
                game_id,
                achievement_id,
            } => {
                app.cmd_achievement_set(game_id, &achievement_id, false)
                    .await?
            }
        },
        Commands::Sync { discover } => app.cmd_sync(discover).await?,
        Commands::Watch { game_id } => app.cmd_watch(game_id).await?,
        Commands::User { action } => match action {
            UserCommands::Login { steam_id } => app.cmd_user_login(&steam_id).await?,
            UserCommands::Logout => app.cmd_user_logout().await?,
            UserCommands::Show => app.cmd_user_show().await?,
        },
        Commands::Lang { action } => match action {
            LangCommands::Set { code } => app.cmd_lang_set(&code).await?,
            LangCommands::Show => app.cmd_lang_show().await?,
        },
    }

    Ok(())
}
