//! CLI entry point for the outcall tool.

use std::fmt::Debug;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use outcall::http::{HttpClient, HttpClientConfig, HttpRequest, TransferProgress, default_file_name};
use outcall::native::{FunctionBinding, NativeBinder, NativeReturn, NativeType, NativeValue};
use tracing::{debug, info};

mod cli;

use cli::{Args, CallArgs, Command, FetchArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Fetch(fetch) => run_fetch(fetch, args.quiet).await,
        Command::Call(call) => run_call(&call),
    }
}

async fn run_fetch(args: FetchArgs, quiet: bool) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => HttpClientConfig::load(path)?,
        None => HttpClientConfig::default(),
    };
    if args.no_redirect {
        config.auto_redirect = false;
    }
    if args.cookies {
        config.use_cookies = true;
    }
    if let Some(user_agent) = &args.user_agent {
        config.user_agent.clone_from(user_agent);
    }
    let client = HttpClient::from_config(&config)?;

    let mut request = if args.is_post() {
        HttpRequest::post(&client, &args.url)
    } else {
        HttpRequest::get(&client, &args.url)
    };
    for (key, value) in &args.query {
        request = request.query(key, value);
    }
    for (key, value) in &args.form {
        request = request.post_value(key, value);
    }
    for (field, path) in &args.files {
        request = request.file_from_path(field, Path::new(path))?;
    }
    if let Some(data) = &args.data {
        request = request.post_data(data.as_bytes(), args.content_type.as_str());
    }
    for (name, value) in &args.headers {
        request = request.header(name, value);
    }

    let output = if args.remote_name {
        Some(default_file_name(&request.build_url()?))
    } else {
        args.output.clone()
    };

    let Some(output) = output else {
        let body = request.read_as_text().await?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(body.as_bytes())?;
        stdout.flush()?;
        return Ok(());
    };

    save_with_progress(request, &output, quiet).await
}

async fn save_with_progress(request: HttpRequest, output: &Path, quiet: bool) -> Result<()> {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::no_length()
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner} {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(output.display().to_string());

    let mut on_progress = |progress: TransferProgress| {
        if let Some(length) = progress.content_length {
            bar.set_length(length);
        }
        bar.set_position(progress.total);
    };

    let result = request.read_to_file(output, Some(&mut on_progress)).await;
    bar.finish_and_clear();
    let bytes = result?;

    info!(path = %output.display(), bytes, "saved response");
    Ok(())
}

fn run_call(args: &CallArgs) -> Result<()> {
    let binder = NativeBinder::new();
    let library = binder.library(args.library.as_str());

    let mut params = Vec::with_capacity(args.args.len());
    let mut values = Vec::with_capacity(args.args.len());
    for raw in &args.args {
        let (text, ty) = raw
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("argument {raw:?} must be VALUE:TYPE"))?;
        let ty: NativeType = ty.parse().map_err(|e: String| anyhow!(e))?;
        values.push(NativeValue::parse_as(ty, text).map_err(|e| anyhow!(e))?);
        params.push(ty);
    }

    let export = args.export.as_str();
    let (convention, charset) = (args.convention, args.charset);
    let ret = args.ret.to_ascii_lowercase();
    if ret == "void" {
        let binding = binder.bind_void(&library, export, convention, charset, &params)?;
        // SAFETY: the signature is declared by the user on the command line.
        unsafe { binding.invoke(&values) }?;
        return Ok(());
    }

    let ty: NativeType = ret.parse().map_err(|e: String| anyhow!(e))?;
    macro_rules! bind_and_print {
        ($t:ty) => {{
            let binding = binder.bind::<$t>(&library, export, convention, charset, &params)?;
            print_result(&binding, &values)
        }};
    }
    match ty {
        NativeType::Bool => bind_and_print!(bool),
        NativeType::I8 => bind_and_print!(i8),
        NativeType::U8 => bind_and_print!(u8),
        NativeType::I16 => bind_and_print!(i16),
        NativeType::U16 => bind_and_print!(u16),
        NativeType::I32 => bind_and_print!(i32),
        NativeType::U32 => bind_and_print!(u32),
        NativeType::I64 => bind_and_print!(i64),
        NativeType::U64 => bind_and_print!(u64),
        NativeType::ISize => bind_and_print!(isize),
        NativeType::USize => bind_and_print!(usize),
        NativeType::Pointer => bind_and_print!(*mut std::ffi::c_void),
        NativeType::F32 => bind_and_print!(f32),
        NativeType::F64 => bind_and_print!(f64),
        NativeType::Str => bail!("str is not a supported return type"),
    }
}

fn print_result<R: NativeReturn + Debug>(
    binding: &FunctionBinding<R>,
    values: &[NativeValue],
) -> Result<()> {
    debug!(
        binding = %binding.qualified_name(),
        params = ?binding.params(),
        convention = ?binding.convention(),
        charset = ?binding.charset(),
        "invoking native export"
    );
    // SAFETY: the signature is declared by the user on the command line.
    let value = unsafe { binding.invoke(values) }
        .with_context(|| format!("calling {}", binding.qualified_name()))?;
    println!("{value:?}");
    Ok(())
}
