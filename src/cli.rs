//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use outcall::native::{CallingConvention, CharSet};

/// Call native library exports and fetch HTTP resources.
#[derive(Parser, Debug)]
#[command(name = "outcall")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send an HTTP request and print or save the response body
    Fetch(FetchArgs),
    /// Call an export of a shared library and print the result
    Call(CallArgs),
}

#[derive(ClapArgs, Debug)]
pub struct FetchArgs {
    /// Base URL (may already carry a query string)
    pub url: String,

    /// Query parameter to append (repeatable)
    #[arg(
        short = 'Q',
        long = "query",
        value_name = "KEY=VALUE",
        value_parser = parse_pair
    )]
    pub query: Vec<(String, String)>,

    /// Form field for a POST body (repeatable)
    #[arg(
        short = 'd',
        long = "form",
        value_name = "KEY=VALUE",
        value_parser = parse_pair
    )]
    pub form: Vec<(String, String)>,

    /// File attachment for a multipart POST (repeatable)
    #[arg(
        short = 'F',
        long = "file",
        value_name = "FIELD=PATH",
        value_parser = parse_pair
    )]
    pub files: Vec<(String, String)>,

    /// Raw POST payload
    #[arg(long)]
    pub data: Option<String>,

    /// Content type of the raw POST payload
    #[arg(long, default_value = "application/octet-stream")]
    pub content_type: String,

    /// Extra request header (repeatable)
    #[arg(
        short = 'H',
        long = "header",
        value_name = "NAME:VALUE",
        value_parser = parse_header
    )]
    pub headers: Vec<(String, String)>,

    /// Force POST even without a body
    #[arg(long)]
    pub post: bool,

    /// Write the body to this file instead of stdout
    #[arg(short, long, conflicts_with = "remote_name")]
    pub output: Option<PathBuf>,

    /// Write the body to a file named after the last URL segment
    #[arg(short = 'O', long)]
    pub remote_name: bool,

    /// Do not follow redirects
    #[arg(long)]
    pub no_redirect: bool,

    /// Enable cookie handling
    #[arg(long)]
    pub cookies: bool,

    /// Override the User-Agent header
    #[arg(long)]
    pub user_agent: Option<String>,

    /// JSON client configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl FetchArgs {
    /// Whether the request should be sent as a POST.
    #[must_use]
    pub fn is_post(&self) -> bool {
        self.post || !self.form.is_empty() || !self.files.is_empty() || self.data.is_some()
    }
}

#[derive(ClapArgs, Debug)]
pub struct CallArgs {
    /// Library path or file name
    pub library: String,

    /// Export name
    pub export: String,

    /// Return type (void, i32, u64, f64, ptr, ...)
    #[arg(long, default_value = "void")]
    pub ret: String,

    /// Calling convention (cdecl, stdcall, winapi)
    #[arg(long, default_value = "cdecl")]
    pub convention: CallingConvention,

    /// String marshaling (ansi, unicode, auto)
    #[arg(long, default_value = "auto")]
    pub charset: CharSet,

    /// Arguments as VALUE:TYPE, e.g. -5:i32 or hello:str
    #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
    pub args: Vec<String>,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected NAME:VALUE, got {raw:?}"))
}
