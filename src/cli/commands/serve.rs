//! sieve serve - One session over JSON lines
//!
//! Reads one request per line from stdin and answers each with one response
//! line on stdout. The session ends on `end_session` or end of input.

use std::io::{BufRead, Write};

use clap::Args;

use crate::app::AppContext;
use crate::cli::commands::CorpusArgs;
use crate::cli::output::emit_line;
use crate::error::Result;
use crate::session::protocol::dispatch;
use crate::session::{Request, Response, SessionRegistry};

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,
}

pub fn run(ctx: &AppContext, args: &ServeArgs) -> Result<()> {
    let (dataset, _) = args.corpus.load(ctx, false)?;
    let registry = SessionRegistry::new(dataset, ctx.config.clone());
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let handled = serve_lines(&registry, stdin.lock(), &mut stdout.lock())?;
    tracing::info!(requests = handled, "serve finished");
    Ok(())
}

/// Serves one session from `reader` to `writer`, returning how many
/// requests were answered.
pub fn serve_lines(
    registry: &SessionRegistry,
    reader: impl BufRead,
    writer: &mut impl Write,
) -> Result<usize> {
    let id = registry.create()?.id;
    let mut handled = 0;
    let mut ended = false;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request = Request::parse(&line);
        let is_end = matches!(request, Ok(Request::EndSession));
        let result = request.and_then(|request| {
            registry.with_session(id, |session| dispatch(session, request))
        });
        emit_line(writer, &Response::from_result(result))?;
        handled += 1;
        if is_end {
            ended = true;
            break;
        }
    }

    if !ended {
        tracing::debug!("input closed without end_session");
    }
    registry.end(id)?;
    Ok(handled)
}
