use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::constants::{AI_STEP_DELAY_MS, DEFAULT_ESCAPE_PROBABILITY};
use crate::engine::GameRoomOptions;

#[derive(Clone, Debug, Parser)]
#[command(name = "server", about = "Turn-based grid arena match server")]
pub struct ServerArgs {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(long, env = "MAPS_DIR", default_value = "maps")]
    pub maps_dir: PathBuf,
    #[arg(long = "stats-path", env = "STATS_DB_PATH", default_value = ".data/stats.json")]
    pub stats_path: PathBuf,
    #[arg(long, env = "AI_STEP_DELAY_MS", default_value_t = AI_STEP_DELAY_MS)]
    pub ai_step_delay_ms: u64,
    #[arg(long, default_value_t = DEFAULT_ESCAPE_PROBABILITY, value_parser = parse_probability)]
    pub escape_probability: f64,
}

impl ServerArgs {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            ai_step_delay: Duration::from_millis(self.ai_step_delay_ms),
            escape_probability: self.escape_probability,
            seed: None,
        }
    }
}

/// Runtime knobs the hub hands to every room it creates.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub ai_step_delay: Duration,
    pub escape_probability: f64,
    pub seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ai_step_delay: Duration::from_millis(AI_STEP_DELAY_MS),
            escape_probability: DEFAULT_ESCAPE_PROBABILITY,
            seed: None,
        }
    }
}

impl EngineOptions {
    /// Per-room options. A fixed seed is offset by the room's ordinal so rooms differ.
    pub fn room_options(&self, ordinal: u64) -> GameRoomOptions {
        GameRoomOptions {
            escape_probability: self.escape_probability,
            seed: self.seed.map(|seed| seed.wrapping_add(ordinal)),
        }
    }
}

pub fn parse_probability(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{value} is outside 0.0..=1.0"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    /// Declared default of one argument. Exported env vars don't leak in here.
    fn declared_default(id: &str) -> Option<String> {
        let command = ServerArgs::command();
        let arg = command.get_arguments().find(|arg| arg.get_id() == id)?;
        arg.get_default_values()
            .first()
            .map(|value| value.to_string_lossy().into_owned())
    }

    #[test]
    fn defaults_match_documented_values() {
        assert_eq!(declared_default("port").as_deref(), Some("8080"));
        assert_eq!(declared_default("maps_dir").as_deref(), Some("maps"));
        assert_eq!(declared_default("stats_path").as_deref(), Some(".data/stats.json"));
        let delay = AI_STEP_DELAY_MS.to_string();
        assert_eq!(declared_default("ai_step_delay_ms").as_deref(), Some(delay.as_str()));

        // Only the flag without an env fallback is checked through a real parse.
        let args = ServerArgs::try_parse_from(["server"]).expect("defaults parse");
        assert_eq!(args.escape_probability, DEFAULT_ESCAPE_PROBABILITY);
        let options = ServerArgs::try_parse_from([
            "server",
            "--ai-step-delay-ms",
            delay.as_str(),
        ])
        .expect("explicit delay parses")
        .engine_options();
        assert_eq!(options.ai_step_delay, Duration::from_millis(AI_STEP_DELAY_MS));
        assert_eq!(options.escape_probability, DEFAULT_ESCAPE_PROBABILITY);
    }

    #[test]
    fn escape_probability_must_be_a_probability() {
        assert!(ServerArgs::try_parse_from(["server", "--escape-probability", "1.5"]).is_err());
        assert!(ServerArgs::try_parse_from(["server", "--escape-probability", "x"]).is_err());
        let args = ServerArgs::try_parse_from(["server", "--escape-probability", "0.25"])
            .expect("valid probability");
        assert_eq!(args.escape_probability, 0.25);
    }

    #[test]
    fn seeded_rooms_get_distinct_seeds() {
        let options = EngineOptions {
            seed: Some(10),
            ..EngineOptions::default()
        };
        assert_eq!(options.room_options(0).seed, Some(10));
        assert_eq!(options.room_options(3).seed, Some(13));
        assert_eq!(EngineOptions::default().room_options(3).seed, None);
    }
}
