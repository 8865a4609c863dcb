//! Line-driven quiz in the terminal.
//!
//! Input lines and countdown timeouts are raced on one task, so every session
//! transition happens in order on the same thread of control. Only the waits
//! are raced; transitions run in the `select!` handlers, after the losing
//! branch has been dropped.

use quiz_core::model::{MetricsFilter, QbankId};
use services::{Direction, QuizOptions, QuizRunner, QuizServices, SessionPhase};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    /// Zero-based option index.
    Answer(usize),
    Next,
    Prev,
    Continue,
    Pause,
    Quit,
    Help,
    Unknown,
}

impl Input {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if let Ok(choice) = line.parse::<usize>() {
            return choice.checked_sub(1).map_or(Self::Unknown, Self::Answer);
        }
        match line.to_ascii_lowercase().as_str() {
            "n" | "next" => Self::Next,
            "p" | "prev" => Self::Prev,
            "" | "c" | "continue" => Self::Continue,
            "pause" | "resume" => Self::Pause,
            "q" | "quit" => Self::Quit,
            "?" | "h" | "help" => Self::Help,
            _ => Self::Unknown,
        }
    }
}

fn print_help() {
    println!("Answer with the option number. Other commands:");
    println!("  n/next  p/prev  c/continue (or empty line)  pause  q/quit  ?/help");
}

fn render(runner: &QuizRunner) {
    let Some(session) = runner.session() else {
        return;
    };
    let progress = session.progress();
    match progress.phase {
        SessionPhase::Paused => println!("Paused. Type `pause` to resume."),
        SessionPhase::Completed | SessionPhase::Quit => {}
        SessionPhase::Running | SessionPhase::Explaining => {
            let Some(question) = session.current_question() else {
                return;
            };
            println!();
            println!(
                "[{}/{}] score {}",
                progress.position + 1,
                progress.total,
                progress.score
            );
            println!("{}", question.question);
            for (index, option) in question.options.iter().enumerate() {
                let marker = if progress.selected_answer == Some(index) {
                    '>'
                } else {
                    ' '
                };
                println!("{marker} {}. {option}", index + 1);
            }

            if progress.phase == SessionPhase::Explaining {
                let verdict = match progress.selected_answer {
                    Some(choice) if question.is_correct(choice) => "Correct.",
                    Some(_) => "Incorrect.",
                    None => "Time is up.",
                };
                println!("{verdict} The answer is {}.", question.correct_answer + 1);
                if let Some(explanation) = &question.explanation {
                    println!("{explanation}");
                }
                println!("Press enter to continue.");
            }
        }
    }
}

/// Run one quiz to completion or until the user quits.
///
/// # Errors
///
/// Returns an error if the quiz cannot start or stdin cannot be read.
pub async fn run_quiz(
    services: &QuizServices,
    bank: &QbankId,
    options: QuizOptions,
    filters: &[MetricsFilter],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut runner = services.new_runner();
    runner.start_filtered(bank, options, filters).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_help();
    render(&runner);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    runner.quit().await;
                    break;
                };
                match Input::parse(&line) {
                    Input::Answer(choice) => {
                        runner.submit_answer(choice).await;
                    }
                    Input::Next => {
                        runner.navigate(Direction::Next).await;
                    }
                    Input::Prev => {
                        runner.navigate(Direction::Prev).await;
                    }
                    Input::Continue => {
                        runner.continue_after_explanation().await;
                    }
                    Input::Pause => {
                        runner.toggle_pause().await;
                    }
                    Input::Quit => {
                        if let Some(record) = runner.quit().await {
                            println!("Quit with {}/{}.", record.score, record.total_questions);
                        }
                        break;
                    }
                    Input::Help => print_help(),
                    Input::Unknown => println!("Unrecognized input; type ? for help."),
                }
            }
            generation = runner.next_timeout() => {
                if runner.on_timeout(generation).await.is_some() {
                    println!("Time is up.");
                }
            }
        }

        if runner
            .progress()
            .is_some_and(|progress| progress.phase == SessionPhase::Completed)
        {
            if let Some(record) = runner.last_history() {
                println!();
                println!(
                    "Finished: {}/{} ({:.0}%).",
                    record.score,
                    record.total_questions,
                    record.ratio() * 100.0
                );
            }
            break;
        }
        render(&runner);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inputs() {
        assert_eq!(Input::parse("1"), Input::Answer(0));
        assert_eq!(Input::parse(" 3 "), Input::Answer(2));
        assert_eq!(Input::parse("0"), Input::Unknown);
        assert_eq!(Input::parse(""), Input::Continue);
        assert_eq!(Input::parse("NEXT"), Input::Next);
        assert_eq!(Input::parse("pause"), Input::Pause);
        assert_eq!(Input::parse("q"), Input::Quit);
        assert_eq!(Input::parse("what"), Input::Unknown);
    }
}
