use clap::{Parser, Subcommand, ValueEnum};
use leaderboard::{
    GameName, GitLabStore, MatchOutcome, Recorder, Winner,
    settings::{self, Settings},
    store::RatingChange,
};
use ratings::trueskill::TrueSkillConfig;

#[derive(Parser)]
#[command(
    name = "leaderboard",
    about = "TrueSkill leaderboards kept in a GitLab repository",
    long_about = "Records matches, shows standings and rebuilds ratings from the match history. \
    Connection settings come from the environment or a .env file: GITLAB_TOKEN, GITLAB_PROJECT_ID, \
    GITLAB_BRANCH, GITLAB_API_URL."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error), overrides LOG_LEVEL
    #[arg(short, long, global = true, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every game with stored documents
    Games,
    /// Ranking by conservative score (mu - 3 sigma)
    Standings { game: GameName },
    /// Recorded matches, oldest first
    History { game: GameName },
    /// Each player's mu after every match
    Progression { game: GameName },
    /// Record a finishing order, winner first
    RecordIndividual {
        game: GameName,
        #[arg(required = true, num_args = 2..)]
        results: Vec<String>,
    },
    /// Record a match between two teams
    RecordTeam {
        game: GameName,
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        team_a: Vec<String>,
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        team_b: Vec<String>,
        #[arg(long, value_enum)]
        winner: Side,
    },
    /// Record a free-for-all as `player=rank` pairs; equal ranks share the place
    RecordFfa {
        game: GameName,
        #[arg(required = true, num_args = 2.., value_parser = parse_placement)]
        placements: Vec<(String, usize)>,
    },
    /// Remove the last recorded match and recompute ratings
    Undo { game: GameName },
    /// Rebuild the leaderboard from the match history
    Repair { game: GameName },
    /// Delete every rating and match of a game
    Wipe {
        game: GameName,
        #[arg(long)]
        yes: bool,
    },
    /// Suggest two balanced teams from an even group of at most 20 players
    Teams {
        game: GameName,
        #[arg(required = true, num_args = 2..)]
        players: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    A,
    B,
}

impl From<Side> for Winner {
    fn from(side: Side) -> Self {
        match side {
            Side::A => Self::TeamA,
            Side::B => Self::TeamB,
        }
    }
}

fn parse_placement(raw: &str) -> Result<(String, usize), String> {
    let (player, rank) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected `player=rank`, got `{raw}`"))?;
    let rank = rank
        .trim()
        .parse()
        .map_err(|err| format!("invalid rank in `{raw}`: {err}"))?;
    Ok((player.trim().to_string(), rank))
}

fn print_changes(changes: &[RatingChange]) {
    for change in changes {
        println!(
            "{:<20} {:>7.2} -> {:>7.2}  (sigma {:.2} -> {:.2})",
            change.player,
            change.before.rating,
            change.after.rating,
            change.before.uncertainty,
            change.after.uncertainty
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = args
        .log_level
        .as_deref()
        .and_then(settings::to_log_level)
        .or_else(|| std::env::var("LOG_LEVEL").ok().as_deref().and_then(settings::to_log_level))
        .unwrap_or(settings::DEFAULT_LOG_LEVEL);
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))?;

    let settings = Settings::try_from_env()?;
    let store = GitLabStore::new(reqwest::Client::new(), &settings)?;
    let recorder = Recorder::new(store, TrueSkillConfig::new());

    match args.command {
        Command::Games => {
            for game in recorder.games().await? {
                println!("{game}");
            }
        }
        Command::Standings { game } => {
            for row in recorder.standings(&game).await? {
                println!(
                    "{:>3}. {:<20} {:>7.2}  mu {:>6.2}  sigma {:>5.2}  wins {}/{}",
                    row.position,
                    row.player,
                    row.conservative,
                    row.standing.rating.rating,
                    row.standing.rating.uncertainty,
                    row.standing.wins,
                    row.standing.played
                );
            }
        }
        Command::History { game } => {
            for outcome in &recorder.history(&game).await? {
                println!("{outcome}");
            }
        }
        Command::Progression { game } => {
            for (player, means) in recorder.progression(&game).await? {
                let means: Vec<String> = means.iter().map(|mu| format!("{mu:.2}")).collect();
                println!("{player:<20} {}", means.join(" "));
            }
        }
        Command::RecordIndividual { game, results } => {
            print_changes(&recorder.record(&game, MatchOutcome::individual(results)).await?);
        }
        Command::RecordTeam {
            game,
            team_a,
            team_b,
            winner,
        } => {
            let outcome = MatchOutcome::team(team_a, team_b, winner.into());
            print_changes(&recorder.record(&game, outcome).await?);
        }
        Command::RecordFfa { game, placements } => {
            print_changes(&recorder.record(&game, MatchOutcome::free_for_all(placements)).await?);
        }
        Command::Undo { game } => {
            let undone = recorder.undo(&game).await?;
            println!("removed {undone}");
        }
        Command::Repair { game } => {
            let leaderboard = recorder.repair(&game).await?;
            println!("rebuilt {} players", leaderboard.len());
        }
        Command::Wipe { game, yes } => {
            anyhow::ensure!(yes, "wiping `{game}` deletes every rating and match; pass --yes to confirm");
            recorder.wipe(&game).await?;
            println!("wiped {game}");
        }
        Command::Teams { game, players } => {
            let split = recorder.suggest_teams(&game, &players).await?;
            println!("Team A: {} ({:.2})", split.team_a.join(", "), split.score_a);
            println!("Team B: {} ({:.2})", split.team_b.join(", "), split.score_b);
            println!(
                "quality {:.1}%, team A wins {:.1}%",
                split.quality * 100.0,
                split.win_probability_a * 100.0
            );
        }
    }

    Ok(())
}
