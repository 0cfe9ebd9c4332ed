use anyhow::Result;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::io::Write;

use heron::models::message::Message;

/// Drive the reply stream to completion, writing text fragments to `out`
/// as they arrive and stopping at the first error.
///
/// The stream is polled strictly one event at a time, so fragments appear
/// in exactly the order they are produced. Output always ends with a
/// single newline, whether the stream was exhausted or halted on an
/// error. Returns false when the session ended on an error event.
pub async fn drain<W, E>(
    mut stream: BoxStream<'_, Result<Message>>,
    out: &mut W,
    err: &mut E,
) -> Result<bool>
where
    W: Write,
    E: Write,
{
    let mut clean = true;

    while let Some(event) = stream.next().await {
        match event {
            Ok(message) => {
                for content in &message.content {
                    if let Some(text) = content.as_text() {
                        if !text.is_empty() {
                            write!(out, "{}", text)?;
                            out.flush()?;
                        }
                    }
                }
            }
            Err(e) => {
                writeln!(err, "ERROR: {}", e)?;
                clean = false;
                break;
            }
        }
    }

    writeln!(out)?;
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn text(fragment: &str) -> Result<Message> {
        Ok(Message::assistant().with_text(fragment))
    }

    fn boxed(events: Vec<Result<Message>>) -> BoxStream<'static, Result<Message>> {
        futures::stream::iter(events).boxed()
    }

    #[tokio::test]
    async fn test_fragments_in_order_with_single_trailing_newline() -> Result<()> {
        let mut out = Vec::new();
        let mut err = Vec::new();

        let clean = drain(
            boxed(vec![text("Hello"), text(", "), text("world")]),
            &mut out,
            &mut err,
        )
        .await?;

        assert!(clean);
        assert_eq!(String::from_utf8(out)?, "Hello, world\n");
        assert!(err.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_stream_still_terminates_output() -> Result<()> {
        let mut out = Vec::new();
        let mut err = Vec::new();

        let clean = drain(boxed(vec![]), &mut out, &mut err).await?;

        assert!(clean);
        assert_eq!(String::from_utf8(out)?, "\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_error_halts_the_loop() -> Result<()> {
        let mut out = Vec::new();
        let mut err = Vec::new();

        let clean = drain(
            boxed(vec![
                text("partial"),
                Err(anyhow!("connection reset")),
                text("never printed"),
            ]),
            &mut out,
            &mut err,
        )
        .await?;

        assert!(!clean);
        assert_eq!(String::from_utf8(out)?, "partial\n");
        assert_eq!(String::from_utf8(err)?, "ERROR: connection reset\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_no_events_requested_after_error() -> Result<()> {
        let polled = Arc::new(AtomicUsize::new(0));
        let seen = polled.clone();

        let events = vec![text("one"), Err(anyhow!("boom")), text("two"), text("three")];
        let stream = futures::stream::iter(events)
            .inspect(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .boxed();

        let mut out = Vec::new();
        let mut err = Vec::new();
        drain(stream, &mut out, &mut err).await?;

        // The fragment before the error, then the error itself
        assert_eq!(polled.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_fragments_are_skipped() -> Result<()> {
        let mut out = Vec::new();
        let mut err = Vec::new();

        drain(
            boxed(vec![text(""), text("content"), text("")]),
            &mut out,
            &mut err,
        )
        .await?;

        assert_eq!(String::from_utf8(out)?, "content\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_messages_print_nothing() -> Result<()> {
        use heron::models::content::Content;

        let mut out = Vec::new();
        let mut err = Vec::new();

        drain(
            boxed(vec![
                Ok(Message::user()
                    .with_tool_response("1", Ok(vec![Content::text("tool output")]))),
                text("answer"),
            ]),
            &mut out,
            &mut err,
        )
        .await?;

        assert_eq!(String::from_utf8(out)?, "answer\n");
        Ok(())
    }
}
