// ABOUTME: Profile recommendation - scores profiles against contextual signals
// ABOUTME: (preference, recent files, task keywords, agent identity).

use std::collections::BTreeMap;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ProfileConfig;

const SCORE_EPSILON: f64 = 1e-9;

/// Signals a recommendation is computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendationContext {
    /// A profile the user asked for explicitly.
    pub user_preference: Option<String>,
    /// Recently touched file paths.
    pub recent_files: Vec<String>,
    /// Keywords describing the current task.
    pub task_keywords: Vec<String>,
    /// Identity of the calling agent.
    pub agent_id: Option<String>,
}

impl RecommendationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_preference(mut self, profile: impl Into<String>) -> Self {
        self.user_preference = Some(profile.into());
        self
    }

    pub fn recent_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recent_files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn task_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// The signal that decided a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    UserPreference,
    FilePattern,
    TaskKeyword,
    AgentOverride,
    /// No signal matched; the current or default profile was kept.
    Fallback,
}

/// Per-signal contributions to one profile's score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub file_pattern: f64,
    pub task_keyword: f64,
    pub agent_override: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.file_pattern + self.task_keyword + self.agent_override
    }

    fn strongest(&self) -> Signal {
        let mut signal = Signal::FilePattern;
        let mut best = self.file_pattern;
        if self.task_keyword > best {
            signal = Signal::TaskKeyword;
            best = self.task_keyword;
        }
        if self.agent_override > best {
            signal = Signal::AgentOverride;
        }
        signal
    }
}

/// A recommended profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRecommendation {
    pub profile: String,
    /// Winning score over the sum of all scores, in `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
    pub signal: Signal,
    /// Score of every profile that matched at least one signal.
    pub scores: BTreeMap<String, ScoreBreakdown>,
}

/// Recommend a profile for `context`.
///
/// A known explicit preference wins outright. Otherwise the profile with the
/// highest weighted score wins; ties go to `active`, then to the
/// alphabetically first name. Returns `None` only when no profiles exist.
pub fn recommend_profile(
    config: &ProfileConfig,
    context: &RecommendationContext,
    active: Option<&str>,
) -> Option<ProfileRecommendation> {
    if config.profiles.is_empty() {
        return None;
    }

    if let Some(preference) = &context.user_preference {
        if config.contains(preference) {
            return Some(ProfileRecommendation {
                profile: preference.clone(),
                confidence: 1.0,
                reason: format!("explicit user preference for '{preference}'"),
                signal: Signal::UserPreference,
                scores: BTreeMap::new(),
            });
        }
        warn!(profile = %preference, "ignoring preference for unknown profile");
    }

    let scores = if config.profile_detection.enabled {
        score_profiles(config, context)
    } else {
        BTreeMap::new()
    };
    let total: f64 = scores.values().map(ScoreBreakdown::total).sum();

    if total <= SCORE_EPSILON {
        return Some(fallback(config, active, scores));
    }

    let best = scores
        .values()
        .map(ScoreBreakdown::total)
        .fold(f64::MIN, f64::max);
    let tied: Vec<&String> = scores
        .iter()
        .filter(|(_, s)| (s.total() - best).abs() <= SCORE_EPSILON)
        .map(|(name, _)| name)
        .collect();

    let active_won_tie = tied.len() > 1 && active.is_some_and(|a| tied.iter().any(|t| *t == a));
    let winner = match active {
        Some(a) if tied.iter().any(|t| *t == a) => a.to_string(),
        _ => tied[0].clone(),
    };

    let breakdown = scores.get(&winner).copied().unwrap_or_default();
    let signal = breakdown.strongest();
    let mut reason = describe(signal, &winner, &breakdown, context, config);
    if active_won_tie {
        reason.push_str(" (tie resolved in favour of the active profile)");
    }

    Some(ProfileRecommendation {
        profile: winner,
        confidence: best / total,
        reason,
        signal,
        scores,
    })
}

fn score_profiles(
    config: &ProfileConfig,
    context: &RecommendationContext,
) -> BTreeMap<String, ScoreBreakdown> {
    let detection = &config.profile_detection;
    let weights = detection.weights;
    let mut scores: BTreeMap<String, ScoreBreakdown> = BTreeMap::new();

    for (profile, patterns) in &detection.heuristics.file_patterns {
        if !config.contains(profile) {
            continue;
        }
        let matched = count_file_matches(patterns, &context.recent_files);
        if matched > 0 {
            scores.entry(profile.clone()).or_default().file_pattern +=
                matched as f64 * weights.file_pattern;
        }
    }

    let task: Vec<String> = context
        .task_keywords
        .iter()
        .map(|k| k.to_lowercase())
        .collect();
    for (profile, keywords) in &detection.heuristics.task_keywords {
        if !config.contains(profile) {
            continue;
        }
        let matched = keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty() && task.iter().any(|t| t.contains(k.as_str())))
            .count();
        if matched > 0 {
            scores.entry(profile.clone()).or_default().task_keyword +=
                matched as f64 * weights.task_keyword;
        }
    }

    if let Some(profile) = context
        .agent_id
        .as_ref()
        .and_then(|agent| config.agent_overrides.get(agent))
    {
        if config.contains(profile) {
            scores.entry(profile.clone()).or_default().agent_override += weights.agent_override;
        }
    }

    scores
}

/// Number of files matching at least one of `patterns`.
fn count_file_matches(patterns: &[String], files: &[String]) -> usize {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let compiled: Vec<Pattern> = patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();
    files
        .iter()
        .filter(|file| compiled.iter().any(|p| p.matches_with(file, options)))
        .count()
}

fn describe(
    signal: Signal,
    profile: &str,
    breakdown: &ScoreBreakdown,
    context: &RecommendationContext,
    config: &ProfileConfig,
) -> String {
    let weights = config.profile_detection.weights;
    match signal {
        Signal::FilePattern => {
            let files = if weights.file_pattern > 0.0 {
                (breakdown.file_pattern / weights.file_pattern).round() as usize
            } else {
                0
            };
            format!("{files} recent file(s) match the file patterns of '{profile}'")
        }
        Signal::TaskKeyword => {
            let keywords = config
                .profile_detection
                .heuristics
                .task_keywords
                .get(profile)
                .map(|k| {
                    k.iter()
                        .filter(|kw| {
                            let kw = kw.to_lowercase();
                            context
                                .task_keywords
                                .iter()
                                .any(|t| t.to_lowercase().contains(&kw))
                        })
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            format!("task keywords match '{profile}': {keywords}")
        }
        Signal::AgentOverride => {
            let agent = context.agent_id.as_deref().unwrap_or_default();
            format!("agent '{agent}' is mapped to '{profile}'")
        }
        Signal::UserPreference | Signal::Fallback => format!("selected '{profile}'"),
    }
}

fn fallback(
    config: &ProfileConfig,
    active: Option<&str>,
    scores: BTreeMap<String, ScoreBreakdown>,
) -> ProfileRecommendation {
    let (profile, reason) = if let Some(active) = active.filter(|a| config.contains(a)) {
        (
            active.to_string(),
            "no matching signals, keeping the active profile".to_string(),
        )
    } else if let Some(default) = config
        .default_profile
        .as_deref()
        .filter(|d| config.contains(d))
    {
        (
            default.to_string(),
            "no matching signals, using the default profile".to_string(),
        )
    } else {
        let first = config.names().into_iter().next().unwrap_or_default();
        (first, "no matching signals".to_string())
    };

    ProfileRecommendation {
        profile,
        confidence: 0.0,
        reason,
        signal: Signal::Fallback,
        scores,
    }
}
