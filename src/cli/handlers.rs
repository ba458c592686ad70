use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::level_filters::LevelFilter;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::commands::{EncodeCommand, LoggingConfig, TrainCommand};
use crate::codec::ExampleEncoder;
use crate::config::StreamConfig;
use crate::example::Example;
use crate::namespace::NamespaceAllocator;
use crate::stream::VwStream;

/// Install the console (stderr) subscriber and, when requested, a log file.
///
/// The returned guard must be held until exit so buffered file output is flushed.
pub fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    LogTracer::init().context("Failed to initialize log tracer")?;

    let level = logging
        .get_effective_level()
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(logging.log_filter.as_deref().unwrap_or(""));

    let timer = ChronoLocal::new("%Y%m%d@%H:%M:%S%.3f".to_string());

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(true);

    let (file_layer, guard) = match &logging.log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = RollingFileAppender::new(Rotation::NEVER, dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(timer)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(guard)
}

async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    Ok(match path {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    })
}

async fn open_output(path: Option<&Path>) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
    Ok(match path {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    })
}

/// Parse JSON-lines examples, skipping blank lines.
pub async fn read_examples<R: AsyncRead + Unpin>(reader: R) -> Result<Vec<Example>> {
    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    let mut examples = Vec::new();
    let mut line_no = 0usize;
    while let Some(line) = lines.next().await {
        let line = line?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let example: Example = serde_json::from_str(&line)
            .with_context(|| format!("Invalid example on line {}", line_no))?;
        examples.push(example);
    }
    Ok(examples)
}

pub async fn handle_train(cmd: TrainCommand) -> Result<()> {
    let mut config = StreamConfig::load(&cmd.config).context("Failed to load configuration")?;
    if let Some(path) = &cmd.initial_model {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read initial model {}", path.display()))?;
        config.initial_model = Some(bytes);
    }

    let examples = read_examples(open_input(cmd.input.as_deref()).await?).await?;
    info!(
        examples = examples.len(),
        passes = cmd.passes,
        "Streaming examples through the engine"
    );

    let (writer, mut reader) = VwStream::spawn(config)
        .await
        .context("Failed to launch engine")?
        .split();

    let passes = cmd.passes;
    let feeder = tokio::spawn(async move {
        let result = async {
            for _ in 0..passes {
                for example in &examples {
                    writer.send(example.clone()).await?;
                }
            }
            Ok::<_, crate::error::Error>(())
        }
        .await;
        // Always let the engine see end of input, even after a failed send
        writer.close();
        result
    });

    let mut out = open_output(cmd.output.as_deref()).await?;
    while let Some(prediction) = reader.next_prediction().await {
        let prediction = prediction.context("Engine output could not be correlated")?;
        let mut line = serde_json::to_string(&prediction)?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
    }
    out.flush().await?;

    feeder
        .await
        .context("Example feeder panicked")?
        .context("Failed to send examples to the engine")?;

    let stats = reader.stats();
    if let Some(path) = &cmd.save_model {
        let model = reader.snapshot().await.context("Failed to retrieve final model")?;
        tokio::fs::write(path, &model)
            .await
            .with_context(|| format!("Failed to write model to {}", path.display()))?;
        info!(bytes = model.len(), path = %path.display(), "Saved final model");
    }

    info!(
        submitted = stats.submitted,
        resolved = stats.resolved,
        unresolved = stats.unresolved_at_exit,
        "Finished"
    );
    eprintln!("average loss = {}", stats.average_loss);
    Ok(())
}

pub async fn handle_encode(cmd: EncodeCommand) -> Result<()> {
    let config = StreamConfig::load(&cmd.config).context("Failed to load configuration")?;

    // Allocate interaction namespaces first, as a launched engine would
    let mut namespaces = NamespaceAllocator::new();
    for (first, second) in &config.quadratic {
        namespaces.allocate(Some(first))?;
        namespaces.allocate(Some(second))?;
    }
    let mut encoder = ExampleEncoder::new(namespaces);

    let examples = read_examples(open_input(cmd.input.as_deref()).await?).await?;
    let mut out = tokio::io::stdout();
    for (i, example) in examples.iter().enumerate() {
        let mut line = encoder.encode(example, i as u64 + 1)?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
    }
    out.flush().await?;

    for (name, ch) in encoder.namespaces().assignments() {
        info!("namespace '{}' -> '{}'", name, ch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_examples_skips_blank_lines() {
        let input = b"{\"resp\": 1, \"featMap\": {\"a\": 1}}\n\n{\"resp\": 2}\n";
        let examples = read_examples(&input[..]).await.unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1].target(), 2.0);
    }

    #[tokio::test]
    async fn test_read_examples_reports_line() {
        let input = b"{\"resp\": 1}\nnot json\n";
        let err = read_examples(&input[..]).await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
