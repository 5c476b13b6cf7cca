use std::io::{self, BufRead, Write};
use trainer_core::stats::ProjectStats;

/// Empty input or `y`/`yes` (any case) means go ahead.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
}

pub fn ask<R: BufRead, W: Write>(
    question: &str,
    input: &mut R,
    output: &mut W,
) -> io::Result<bool> {
    write!(output, "{question} [Y/n]: ")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        // stdin closed: nobody to say yes.
        return Ok(false);
    }
    Ok(is_affirmative(&line))
}

pub fn confirm_training_with<R: BufRead, W: Write>(
    stats: &ProjectStats,
    input: &mut R,
    output: &mut W,
) -> io::Result<bool> {
    writeln!(
        output,
        "\nProject has {} tags and {} tagged images.",
        stats.tag_count, stats.total_images
    )?;
    ask("Start training?", input, output)
}

/// Asks on stderr so stdout stays reserved for the run summary.
pub fn confirm_training(stats: &ProjectStats) -> bool {
    let stdin = io::stdin();
    let mut stderr = io::stderr();
    confirm_training_with(stats, &mut stdin.lock(), &mut stderr).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_answer_is_yes() {
        let mut out = Vec::new();
        assert!(ask("Start training?", &mut "\n".as_bytes(), &mut out).unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), "Start training? [Y/n]: ");
    }

    #[test]
    fn anything_else_declines() {
        let mut out = Vec::new();
        assert!(!ask("Start training?", &mut "n\n".as_bytes(), &mut out).unwrap());
        assert!(!ask("Start training?", &mut "maybe\n".as_bytes(), &mut out).unwrap());
        assert!(!ask("Start training?", &mut "".as_bytes(), &mut out).unwrap());
        assert!(is_affirmative(" Y "));
    }

    #[test]
    fn training_prompt_goes_only_to_the_given_writer() {
        let stats = ProjectStats {
            tag_count: 2,
            total_images: 18,
            tags: Vec::new(),
        };
        let mut prompt_out = Vec::new();
        assert!(confirm_training_with(&stats, &mut "y\n".as_bytes(), &mut prompt_out).unwrap());
        assert_eq!(
            String::from_utf8(prompt_out).unwrap(),
            "\nProject has 2 tags and 18 tagged images.\nStart training? [Y/n]: "
        );
    }
}
