use clap::Parser;

pub mod args;
pub mod handlers;

/// Markup tags in the help template and the ANSI style each one opens.
const HELP_STYLES: &[(&str, &str)] = &[
    ("title", "\x1b[1;33m"),
    ("hl", "\x1b[1;36m"),
    ("cmd", "\x1b[36m"),
    ("group", "\x1b[1;32m"),
    ("dim", "\x1b[2m"),
];

/// Renders the translated help template, dropping the styles when color is off.
fn render_help(template: &str, use_colors: bool) -> String {
    HELP_STYLES.iter().fold(template.to_string(), |text, (tag, style)| {
        let (open, close) = if use_colors { (*style, "\x1b[0m") } else { ("", "") };
        text.replace(&format!("<{tag}>"), open)
            .replace(&format!("</{tag}>"), close)
    })
}

fn build_help_string() -> &'static str {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();
    Box::leak(render_help(t!("cli.help.template"), use_colors).into_boxed_str())
}

/// opensees-run: runs OpenSees analyses, serially or under MPI.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// The command to run (`run`, `sp`, `mp`, `check`, `settings`, `init`).
    #[arg()]
    pub command: Option<String>,

    /// Everything after the command, handed to its handler untouched.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
