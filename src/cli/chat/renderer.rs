use std::io;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Marker appended to a frame while more words are coming.
pub const CURSOR: char = '▌';

/// One visible state of a reply being typed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub text: String,
    pub cursor: bool,
}

impl Frame {
    pub fn typing(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: true,
        }
    }

    pub fn settled(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: false,
        }
    }
}

/// Anything that can display frames.
pub trait FrameSink {
    fn show(&mut self, frame: &Frame) -> io::Result<()>;
}

/// Forwards frames to a host that draws them on another task.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn show(&mut self, frame: &Frame) -> io::Result<()> {
        self.tx
            .send(frame.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "frame receiver closed"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed(String),
    /// Cancelled part way; holds what was on screen.
    Aborted(String),
}

/// Reveals an already complete reply word by word at a fixed pace.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    delay: Duration,
}

impl Renderer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn render<S: FrameSink + ?Sized>(
        &self,
        full_text: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> io::Result<RenderOutcome> {
        let mut buffer = String::with_capacity(full_text.len() + 1);

        for word in full_text.split_whitespace() {
            buffer.push_str(word);
            buffer.push(' ');
            sink.show(&Frame::typing(&buffer))?;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(shown = buffer.len(), total = full_text.len(), "render aborted");
                    sink.show(&Frame::settled(&buffer))?;
                    return Ok(RenderOutcome::Aborted(buffer));
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        sink.show(&Frame::settled(&buffer))?;
        Ok(RenderOutcome::Completed(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<Frame>,
    }

    impl FrameSink for Recorder {
        fn show(&mut self, frame: &Frame) -> io::Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_settles_without_waiting() {
        let mut sink = Recorder::default();
        let start = Instant::now();

        let outcome = Renderer::new(Duration::from_secs(1))
            .render("", &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(outcome, RenderOutcome::Completed(String::new()));
        assert_eq!(sink.frames, vec![Frame::settled("")]);
    }

    #[tokio::test(start_paused = true)]
    async fn types_one_word_per_delay() {
        let delay = Duration::from_millis(50);
        let mut sink = Recorder::default();
        let start = Instant::now();

        let outcome = Renderer::new(delay)
            .render("a b c", &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= delay * 3 && elapsed < delay * 4, "{elapsed:?}");
        assert_eq!(outcome, RenderOutcome::Completed("a b c ".to_string()));
        assert_eq!(
            sink.frames,
            vec![
                Frame::typing("a "),
                Frame::typing("a b "),
                Frame::typing("a b c "),
                Frame::settled("a b c "),
            ]
        );
    }

    #[tokio::test]
    async fn collapses_runs_of_whitespace() {
        let mut sink = Recorder::default();
        Renderer::new(Duration::ZERO)
            .render("  Report\n\tcreated  ", &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sink.frames.last(), Some(&Frame::settled("Report created ")));
        assert_eq!(sink.frames.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_after_first_word() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = Recorder::default();

        let outcome = Renderer::new(Duration::from_secs(1))
            .render("one two three", &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, RenderOutcome::Aborted("one ".to_string()));
        assert_eq!(
            sink.frames,
            vec![Frame::typing("one "), Frame::settled("one ")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_pending_delay() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut sink = Recorder::default();

        let renderer = Renderer::new(Duration::from_secs(10));
        let render = renderer.render("one two", &mut sink, &cancel);
        let stop = async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        };
        let start = Instant::now();
        let (outcome, _) = tokio::join!(render, stop);

        assert_eq!(outcome.unwrap(), RenderOutcome::Aborted("one two ".to_string()));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(20));
    }

    #[tokio::test]
    async fn channel_sink_forwards_frames() {
        let (mut sink, mut rx) = ChannelSink::new();
        Renderer::new(Duration::ZERO)
            .render("hi there", &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        drop(sink);

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(
            frames,
            vec![
                Frame::typing("hi "),
                Frame::typing("hi there "),
                Frame::settled("hi there "),
            ]
        );
    }

    #[tokio::test]
    async fn closed_channel_fails_render() {
        let (mut sink, rx) = ChannelSink::new();
        drop(rx);
        let err = Renderer::new(Duration::ZERO)
            .render("hi", &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
