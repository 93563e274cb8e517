// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use serde_json::Value;

/// Chat prefix the dispatcher listens for.
pub const COMMAND_PREFIX: &str = "h!";

/// Short mode tokens, in the order they are listed in usage replies.
pub const SUPPORTED_MODE_TOKENS: &str = "bw, mm, sw";

const RATIO_SIGNIFICANT_DIGITS: i32 = 4;

/// The closed set of game modes the bot can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    Bedwars,
    MurderMystery,
    SkyWars,
}

impl GameMode {
    /// Match a chat token against the mode set. Tokens are case-sensitive;
    /// both the short and the long alias of each mode match.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "bw" | "bedwars" => Some(Self::Bedwars),
            "mm" | "murdermystery" => Some(Self::MurderMystery),
            "sw" | "skywars" => Some(Self::SkyWars),
            _ => None,
        }
    }

    /// Key of this mode's block under the record's `stats` object.
    pub fn stats_key(self) -> &'static str {
        match self {
            Self::Bedwars => "Bedwars",
            Self::MurderMystery => "MurderMystery",
            Self::SkyWars => "SkyWars",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Bedwars => "Bedwars",
            Self::MurderMystery => "Murder Mystery",
            Self::SkyWars => "SkyWars",
        }
    }
}

/// Fixed-shape projection of one mode's stats block. Derived ratios are
/// stored already rendered to 4 significant digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeStats {
    Bedwars {
        wins: u64,
        losses: u64,
        winstreak: u64,
        fkdr: String,
    },
    MurderMystery {
        wins: u64,
        kd: String,
    },
    SkyWars {
        wins: u64,
        losses: u64,
        kills: u64,
        deaths: u64,
    },
}

impl ModeStats {
    /// The reply fragment after `Stats for <player>: `.
    pub fn summary(&self) -> String {
        match self {
            Self::Bedwars {
                wins,
                losses,
                winstreak,
                fkdr,
            } => format!("Wins: {wins}, Losses: {losses}, Winstreak: {winstreak}, FKDR: {fkdr}"),
            Self::MurderMystery { wins, kd } => format!("Wins: {wins}, KD: {kd}"),
            Self::SkyWars {
                wins,
                losses,
                kills,
                deaths,
            } => format!("Wins: {wins}, Losses: {losses}, Kills: {kills}, Deaths: {deaths}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFormatError {
    /// The requested token is not in the supported mode set.
    UnsupportedMode,
    /// The player has no stats block for this mode.
    NoModeData,
}

impl StatsFormatError {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedMode => "unsupported_mode",
            Self::NoModeData => "no_mode_data",
        }
    }
}

/// Project a raw player record into the stats for one mode.
///
/// The record is the untyped tree the stats service returns; only the
/// block under `stats.<mode key>` is read. An absent block is
/// `NoModeData`. Counters absent inside a present block read as 0, since
/// the stats service omits counters that were never incremented.
pub fn mode_stats(record: &Value, mode_token: &str) -> Result<ModeStats, StatsFormatError> {
    let mode = GameMode::parse(mode_token).ok_or(StatsFormatError::UnsupportedMode)?;
    let block = record
        .get("stats")
        .and_then(|stats| stats.get(mode.stats_key()))
        .filter(|block| block.is_object())
        .ok_or(StatsFormatError::NoModeData)?;

    Ok(match mode {
        GameMode::Bedwars => ModeStats::Bedwars {
            wins: counter(block, "wins_bedwars"),
            losses: counter(block, "losses_bedwars"),
            winstreak: counter(block, "winstreak"),
            fkdr: format_ratio(
                counter(block, "final_kills_bedwars"),
                counter(block, "final_deaths_bedwars"),
            ),
        },
        GameMode::MurderMystery => ModeStats::MurderMystery {
            wins: counter(block, "wins"),
            kd: format_ratio(counter(block, "kills"), counter(block, "deaths")),
        },
        GameMode::SkyWars => ModeStats::SkyWars {
            wins: counter(block, "wins"),
            losses: counter(block, "losses"),
            kills: counter(block, "kills"),
            deaths: counter(block, "deaths"),
        },
    })
}

fn counter(block: &Value, key: &str) -> u64 {
    block.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Kill/death style ratio rendered to 4 significant digits. A zero
/// deaths counter reports the kill count itself (flawless record
/// convention) instead of dividing by zero.
pub fn format_ratio(kills: u64, deaths: u64) -> String {
    if deaths == 0 {
        return format_significant(kills as f64);
    }
    format_significant(kills as f64 / deaths as f64)
}

fn format_significant(value: f64) -> String {
    if value == 0.0 {
        return format!("{:.*}", (RATIO_SIGNIFICANT_DIGITS - 1) as usize, 0.0);
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = RATIO_SIGNIFICANT_DIGITS - 1 - magnitude;
    if decimals >= 0 {
        format!("{:.*}", decimals as usize, value)
    } else {
        let scale = 10f64.powi(-decimals);
        format!("{}", (value / scale).round() * scale)
    }
}
