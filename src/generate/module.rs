//! Module content writing: prompts and the markdown structure validator.

use crate::error::{Error, Result};
use crate::llm::TextGenerator;
use crate::model::{CourseModule, Roadmap};

use super::{PromptSpec, Recovery, coerce};

/// The six level-2 headings a module must carry, in this exact order and
/// wording.
pub const REQUIRED_HEADINGS: [&str; 6] = [
    "Overview",
    "Key concepts",
    "Worked example",
    "Practice exercises",
    "Common mistakes",
    "Suggested resources",
];

const WRITER_SYSTEM: &str = "You are an expert course author.\nWrite clear, structured Markdown only.\nNo JSON. No code fences unless showing actual code examples.\nOutput must contain exactly these H2 headings in order:\n## Overview\n## Key concepts\n## Worked example\n## Practice exercises\n## Common mistakes\n## Suggested resources\nNo other top-level headings (# or ##) allowed.";

fn writer_prompt(roadmap: &Roadmap, module: &CourseModule) -> String {
    let outcomes = module
        .outcomes
        .iter()
        .map(|o| format!("- {o}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Course topic: {field}
Learner level: {level}

Week {week} title: {title}
Outcomes:
{outcomes}

Write a markdown lesson with these EXACT headings (use H2 ## format):
## Overview
## Key concepts
## Worked example
## Practice exercises
## Common mistakes
## Suggested resources

Requirements:
- Output must be Markdown only
- Use exactly these 6 headings in this order, no additional # or ## headings
- Worked example: code or a step-by-step walkthrough, whichever fits the topic
- Practice exercises section must have exactly 3 numbered items
- Keep content practical and concise"#,
        field = roadmap.field,
        level = roadmap.level,
        week = module.week,
        title = module.title,
    )
}

/// Validate a module's markdown: exactly the six required H2 headings in
/// order, no other H1/H2 headings, and exactly 3 numbered or bulleted items
/// under "Practice exercises".
pub fn validate_module_markdown(md: &str) -> Result<()> {
    let mut found: Vec<String> = Vec::new();
    let mut practice_items = 0usize;
    let mut in_practice = false;

    for line in md.lines() {
        let line = line.trim();
        if let Some(heading) = line.strip_prefix("## ") {
            let heading = heading.trim();
            in_practice = heading == "Practice exercises";
            found.push(heading.to_string());
        } else if line.starts_with('#') {
            if !line.starts_with("##") {
                return Err(Error::Validation(format!(
                    "unexpected level-1 heading: {line}"
                )));
            }
            // A deeper (###+) heading is allowed but closes the practice
            // exercises section.
            in_practice = false;
        } else if in_practice && is_exercise_item(line) {
            practice_items += 1;
        }
    }

    if found != REQUIRED_HEADINGS {
        for required in REQUIRED_HEADINGS {
            if !found.iter().any(|h| h == required) {
                return Err(Error::Validation(format!(
                    "missing required heading \"## {required}\""
                )));
            }
        }
        for heading in &found {
            if !REQUIRED_HEADINGS.contains(&heading.as_str()) {
                return Err(Error::Validation(format!(
                    "unexpected heading \"## {heading}\""
                )));
            }
        }
        return Err(Error::Validation(format!(
            "headings out of order, expected: {}",
            REQUIRED_HEADINGS
                .map(|h| format!("\"## {h}\""))
                .join(", ")
        )));
    }

    if practice_items != 3 {
        return Err(Error::Validation(format!(
            "\"Practice exercises\" must contain exactly 3 items: found {practice_items}, expected 3"
        )));
    }
    Ok(())
}

fn is_exercise_item(line: &str) -> bool {
    line.bytes().next().is_some_and(|b| b.is_ascii_digit())
        || line.starts_with("- ")
        || line.starts_with("* ")
}

/// Drive the validation-repair engine to format-valid markdown for one
/// module. No extraction round applies to markdown.
pub async fn write_module_content<G>(
    generator: &G,
    roadmap: &Roadmap,
    module: &CourseModule,
) -> Result<String>
where
    G: TextGenerator + ?Sized,
{
    let spec = PromptSpec {
        system: WRITER_SYSTEM.to_string(),
        user: writer_prompt(roadmap, module),
        temperature: 0.2,
        repair_temperature: 0.1,
    };

    coerce(
        generator,
        "module",
        &spec,
        Recovery::None,
        |text| Ok(text.trim().to_string()),
        |markdown: &String| validate_module_markdown(markdown),
    )
    .await
}
