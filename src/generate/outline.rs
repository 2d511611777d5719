//! Outline planning: prompts, schema, and the structural validator.

use crate::error::{Error, Result};
use crate::llm::TextGenerator;
use crate::model::Roadmap;
use serde::{Deserialize, Serialize};

use super::{PromptSpec, Recovery, coerce};

/// Validated week-by-week plan produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub weeks: Vec<WeekPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekPlan {
    pub week: u32,
    pub title: String,
    pub outcomes: Vec<String>,
}

const PLANNER_SYSTEM: &str = "You are a curriculum planner.\n\nYou must return ONLY valid JSON (no markdown, no code fences, no commentary).\nThe JSON must match the given schema exactly.";

fn planner_prompt(roadmap: &Roadmap) -> String {
    let n = roadmap.duration_weeks;
    format!(
        r#"Create a {n}-week learning roadmap for: {field}
Learner level: {level}
Time budget: {hours} hours/week

Output must be STRICT JSON matching this schema:
{{
  "weeks": [
    {{"week": 1, "title": "string", "outcomes": ["string", "string"]}}
  ]
}}

Rules:
- "weeks" must contain exactly {n} items.
- Each week.week must be 1..{n} with no duplicates, in increasing order.
- outcomes: 2-6 items per week, each short and specific.
- Titles must be concise."#,
        field = roadmap.field,
        level = roadmap.level,
        hours = roadmap.weekly_hours,
    )
}

/// Structural rules for an outline against the requested duration:
/// exactly N weeks numbered 1..N strictly increasing, non-empty titles,
/// 2-6 non-empty outcomes each.
pub fn validate_outline(outline: &Outline, duration_weeks: i32) -> Result<()> {
    let n = duration_weeks.max(0) as usize;
    if outline.weeks.len() != n {
        return Err(Error::Validation(format!(
            "expected {n} weeks, found {}",
            outline.weeks.len()
        )));
    }

    let numbers: Vec<u32> = outline.weeks.iter().map(|w| w.week).collect();
    let expected: Vec<u32> = (1..=n as u32).collect();
    if numbers != expected {
        return Err(Error::Validation(format!(
            "week numbers must be exactly 1..{n} in increasing order, found {numbers:?}"
        )));
    }

    for week in &outline.weeks {
        if week.title.trim().is_empty() {
            return Err(Error::Validation(format!(
                "week {} has an empty title",
                week.week
            )));
        }
        if !(2..=6).contains(&week.outcomes.len()) {
            return Err(Error::Validation(format!(
                "week {} must have 2-6 outcomes, found {}",
                week.week,
                week.outcomes.len()
            )));
        }
        if week.outcomes.iter().any(|o| o.trim().is_empty()) {
            return Err(Error::Validation(format!(
                "week {} has an empty outcome",
                week.week
            )));
        }
    }
    Ok(())
}

/// Drive the validation-repair engine to a validated outline for `roadmap`.
pub async fn plan_outline<G>(generator: &G, roadmap: &Roadmap) -> Result<Outline>
where
    G: TextGenerator + ?Sized,
{
    let spec = PromptSpec {
        system: PLANNER_SYSTEM.to_string(),
        user: planner_prompt(roadmap),
        temperature: 0.1,
        repair_temperature: 0.05,
    };
    let duration_weeks = roadmap.duration_weeks;

    coerce(
        generator,
        "outline",
        &spec,
        Recovery::FirstJsonObject,
        |text| {
            serde_json::from_str::<Outline>(text).map_err(|e| Error::Parse(e.to_string()))
        },
        move |outline| validate_outline(outline, duration_weeks),
    )
    .await
}
