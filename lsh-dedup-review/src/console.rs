use crate::review::{Decision, Progress, Reviewer};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lsh_dedup_labeler::dto::RecordPair;
use lsh_dedup_labeler::error::DedupError;
use std::io::{BufRead, Write};
use std::path::Path;

const QUESTION: &str = "Do these records refer to the same thing?";

/// Terminal reviewer: prints the pair side by side and reads one answer per line.
/// End of input counts as "finished".
pub struct ConsoleReviewer<R, W> {
    input: R,
    output: W,
    /// Draw indicatif bars on stderr in addition to the plain counts
    show_bars: bool,
}

impl<R: BufRead, W: Write> ConsoleReviewer<R, W> {
    pub fn new(input: R, output: W, show_bars: bool) -> Self {
        Self {
            input,
            output,
            show_bars,
        }
    }

    fn render(&mut self, fields: &[String], pair: &RecordPair, progress: &Progress) -> std::io::Result<()> {
        let (left, right) = pair;
        let field_width = fields.iter().map(|f| f.chars().count()).max().unwrap_or(0).max(5);
        let left_width = fields
            .iter()
            .map(|f| left.value(f).chars().count())
            .max()
            .unwrap_or(0)
            .max(left.id.chars().count())
            .max(6);

        writeln!(self.output)?;
        writeln!(
            self.output,
            "{:<fw$}  {:<lw$}  {}",
            "field",
            format!("#{}", left.id),
            format!("#{}", right.id),
            fw = field_width,
            lw = left_width
        )?;
        for field in fields {
            writeln!(
                self.output,
                "{:<fw$}  {:<lw$}  {}",
                field,
                left.value(field),
                right.value(field),
                fw = field_width,
                lw = left_width
            )?;
        }
        writeln!(self.output)?;
        writeln!(
            self.output,
            "{}/{} positive, {}/{} negative",
            progress.n_match, progress.target, progress.n_distinct, progress.target
        )?;
        if self.show_bars {
            draw_bar("Positive", progress.n_match, progress.target);
            draw_bar("Negative", progress.n_distinct, progress.target);
        }
        Ok(())
    }

    fn prompt(&mut self, progress: &Progress) -> std::io::Result<()> {
        let previous = if progress.has_previous { ", (p)revious" } else { "" };
        write!(
            self.output,
            "{QUESTION} (y)es, (n)o, (u)nsure, (f)inished{previous}: "
        )?;
        self.output.flush()
    }
}

impl<R: BufRead, W: Write> Reviewer for ConsoleReviewer<R, W> {
    fn review(
        &mut self,
        fields: &[String],
        pair: &RecordPair,
        progress: &Progress,
    ) -> Result<Decision, DedupError> {
        self.render(fields, pair, progress).map_err(stdio_error)?;
        loop {
            self.prompt(progress).map_err(stdio_error)?;
            let mut line = String::new();
            if self.input.read_line(&mut line).map_err(stdio_error)? == 0 {
                writeln!(self.output).map_err(stdio_error)?;
                return Ok(Decision::Finished);
            }
            match line.parse::<Decision>() {
                Ok(Decision::UsePrevious) if !progress.has_previous => {
                    writeln!(self.output, "No previous pair to revisit").map_err(stdio_error)?;
                }
                Ok(decision) => return Ok(decision),
                Err(msg) => writeln!(self.output, "{msg}").map_err(stdio_error)?,
            }
        }
    }
}

fn draw_bar(label: &str, count: usize, target: usize) {
    let bar = ProgressBar::with_draw_target(Some(target as u64), ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template("{prefix:>9} {bar:30.green/blue} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    bar.set_prefix(label.to_string());
    bar.set_position(count.min(target) as u64);
    bar.abandon();
}

fn stdio_error(err: std::io::Error) -> DedupError {
    DedupError::io(Path::new("<stdio>"), err)
}
