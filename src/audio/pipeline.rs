//! Cadena de procesos del transcoder.
//!
//! A pipeline is `source → ffmpeg (decode + filters, s16le PCM) → Opus
//! encoder`, exposed as one [`EncodedStream`] of Opus packets. All stages
//! are owned by a shared teardown guard: the first of stream close, stream
//! error, or an explicit [`PipelineHandle::terminate`] terminates every
//! stage, and later calls are no-ops.

use audiopus::{coder::Encoder, Application, Bitrate, Channels, SampleRate};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    pin::Pin,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader},
    process::{Child, ChildStderr, Command},
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{debug, error, warn};

use crate::audio::error::PipelineError;
use crate::sources::SourceReader;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: usize = 2;
/// 20ms @ 48kHz
pub const FRAME_SIZE: usize = 960;

const PCM_FRAME_BYTES: usize = FRAME_SIZE * CHANNELS * 2;
const MAX_OPUS_PACKET: usize = 4000;
/// Líneas de stderr que se guardan para el mensaje de error
const STDERR_TAIL_LINES: usize = 8;

pub type Packet = Result<Bytes, PipelineError>;

/// Una etapa de la cadena que hay que terminar explícitamente.
pub trait PipelineStage: Send {
    fn name(&self) -> &'static str;

    /// Stop the stage. Must tolerate being called on an already finished stage.
    fn terminate(&mut self);
}

struct Teardown {
    stages: Mutex<Vec<Box<dyn PipelineStage>>>,
    done: AtomicBool,
}

impl Teardown {
    fn run(&self) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }

        let mut stages = self.stages.lock();
        for stage in stages.iter_mut() {
            debug!("🧹 Terminando etapa {}", stage.name());
            stage.terminate();
        }
        true
    }
}

/// Handle compartido para cancelar un pipeline desde fuera del stream.
#[derive(Clone)]
pub struct PipelineHandle {
    teardown: Arc<Teardown>,
}

impl PipelineHandle {
    /// Returns `true` only for the call that actually tore the pipeline down.
    pub fn terminate(&self) -> bool {
        self.teardown.run()
    }

    pub fn is_terminated(&self) -> bool {
        self.teardown.done.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Stream de paquetes Opus (48kHz, stereo, 960 samples per frame).
pub struct EncodedStream {
    packets: flume::r#async::RecvStream<'static, Packet>,
    handle: PipelineHandle,
    finished: bool,
}

impl EncodedStream {
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }
}

impl Stream for EncodedStream {
    type Item = Packet;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.packets.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(packet))) => Poll::Ready(Some(Ok(packet))),
            Poll::Ready(Some(Err(e))) => {
                error!("❌ Error en el pipeline: {}", e);
                self.finished = true;
                self.handle.terminate();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                self.handle.terminate();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EncodedStream {
    fn drop(&mut self) {
        self.handle.terminate();
    }
}

pub struct Pipeline {
    stream: EncodedStream,
}

impl Pipeline {
    pub(crate) fn new(stages: Vec<Box<dyn PipelineStage>>, packets: flume::Receiver<Packet>) -> Self {
        let handle = PipelineHandle {
            teardown: Arc::new(Teardown {
                stages: Mutex::new(stages),
                done: AtomicBool::new(false),
            }),
        };

        Self {
            stream: EncodedStream {
                packets: packets.into_stream(),
                handle,
                finished: false,
            },
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.stream.handle()
    }

    pub fn into_stream(self) -> EncodedStream {
        self.stream
    }

    /// Lanza ffmpeg y el encoder Opus.
    ///
    /// With `source = Some(..)` ffmpeg reads from stdin and a feeder task
    /// copies the source into it; otherwise `args` must carry its own `-i`.
    pub fn spawn(
        program: &str,
        args: &[String],
        source: Option<SourceReader>,
        buffer_frames: usize,
        bitrate: i32,
    ) -> Result<Self, PipelineError> {
        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio)?;
        encoder.set_bitrate(Bitrate::BitsPerSecond(bitrate))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if source.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("🔧 {} {}", program, args.join(" "));
        let mut child = command.spawn().map_err(|source| PipelineError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(PipelineError::MissingPipe("ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(PipelineError::MissingPipe("ffmpeg stderr"))?;

        let mut stages: Vec<Box<dyn PipelineStage>> = Vec::with_capacity(3);

        if let Some(mut reader) = source {
            let mut stdin = child
                .stdin
                .take()
                .ok_or(PipelineError::MissingPipe("ffmpeg stdin"))?;

            let feed = tokio::spawn(async move {
                match tokio::io::copy(&mut reader, &mut stdin).await {
                    Ok(bytes) => debug!("📥 Fuente completa ({} bytes)", bytes),
                    Err(e) => debug!("📥 Alimentación de la fuente detenida: {}", e),
                }
            });
            stages.push(Box::new(TaskStage::new("source", feed)));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        stages.push(Box::new(ProcessStage::spawn("ffmpeg", child, stderr, exit_tx)));

        let (tx, rx) = flume::bounded(buffer_frames.max(1));
        let program = program.to_string();
        let encode = tokio::spawn(async move {
            if encode_pcm(stdout, encoder, &tx).await {
                report_exit(&program, exit_rx, &tx).await;
            }
        });
        stages.push(Box::new(TaskStage::new("opus-encoder", encode)));

        Ok(Self::new(stages, rx))
    }
}

/// Etapa respaldada por una tarea de tokio (source feed, encoder).
struct TaskStage {
    name: &'static str,
    task: Option<JoinHandle<()>>,
}

impl TaskStage {
    fn new(name: &'static str, task: JoinHandle<()>) -> Self {
        Self {
            name,
            task: Some(task),
        }
    }
}

impl PipelineStage for TaskStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn terminate(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Cómo terminó un proceso externo, con la cola de su stderr.
type ProcessExit = (std::io::Result<std::process::ExitStatus>, String);

/// Etapa respaldada por un proceso externo.
///
/// A supervisor task owns the child: it drains stderr, waits for the exit
/// and hands the status to the encoder. Terminating the stage kills it.
struct ProcessStage {
    name: &'static str,
    kill: Option<oneshot::Sender<()>>,
}

impl ProcessStage {
    fn spawn(
        name: &'static str,
        mut child: Child,
        stderr: ChildStderr,
        exit: oneshot::Sender<ProcessExit>,
    ) -> Self {
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let exited = tokio::select! {
                outcome = async {
                    let tail = stderr_tail(stderr).await;
                    (child.wait().await, tail)
                } => Some(outcome),
                _ = kill_rx => None,
            };

            match exited {
                Some(outcome) => {
                    let _ = exit.send(outcome);
                }
                None => {
                    if let Err(e) = child.kill().await {
                        debug!("Proceso {} ya terminado: {}", name, e);
                    }
                }
            }
        });

        Self {
            name,
            kill: Some(kill_tx),
        }
    }
}

impl PipelineStage for ProcessStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn terminate(&mut self) {
        if let Some(kill) = self.kill.take() {
            // The supervisor may already be gone after a normal exit.
            let _ = kill.send(());
        }
    }
}

/// Lee stderr hasta EOF y devuelve las últimas líneas.
async fn stderr_tail<R: AsyncRead + Unpin>(stderr: R) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("stderr ilegible: {}", e);
                break;
            }
        }
    }

    Vec::from(tail).join(" | ")
}

/// Después de EOF en stdout: un exit distinto de cero es un error del pipeline.
async fn report_exit(program: &str, exit: oneshot::Receiver<ProcessExit>, packets: &flume::Sender<Packet>) {
    let failure = match exit.await {
        Ok((Ok(status), _)) if status.success() => return,
        Ok((Ok(status), stderr)) => PipelineError::ProcessExit {
            program: program.to_string(),
            status,
            stderr,
        },
        Ok((Err(e), _)) => PipelineError::Io(e),
        // Killed by teardown
        Err(_) => return,
    };

    if packets.send_async(Err(failure)).await.is_err() {
        debug!("Consumidor del pipeline cerrado");
    }
}

/// Lee PCM s16le en frames de 20ms y los codifica a Opus. The final partial
/// frame is padded with silence. Returns `true` when the input reached EOF.
async fn encode_pcm<R>(mut pcm: R, mut encoder: Encoder, packets: &flume::Sender<Packet>) -> bool
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut frame = vec![0u8; PCM_FRAME_BYTES];
    let mut samples = vec![0i16; FRAME_SIZE * CHANNELS];
    let mut out = vec![0u8; MAX_OPUS_PACKET];

    loop {
        let filled = match read_frame(&mut pcm, &mut frame).await {
            Ok(filled) => filled,
            Err(e) => {
                let _ = packets.send_async(Err(e.into())).await;
                return false;
            }
        };
        if filled == 0 {
            break;
        }

        frame[filled..].fill(0);
        for (sample, bytes) in samples.iter_mut().zip(frame.chunks_exact(2)) {
            *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
        }

        let packet = encoder
            .encode(&samples, &mut out)
            .map(|len| Bytes::copy_from_slice(&out[..len]))
            .map_err(PipelineError::from);
        let failed = packet.is_err();

        if packets.send_async(packet).await.is_err() {
            debug!("Consumidor del pipeline cerrado");
            return false;
        }
        if failed {
            warn!("⚠️ Encoder Opus falló, cerrando pipeline");
            return false;
        }
        if filled < PCM_FRAME_BYTES {
            break;
        }
    }

    debug!("🏁 Encoder terminado");
    true
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Etapa falsa que cuenta terminaciones.
    pub(crate) struct CountingStage {
        pub name: &'static str,
        pub terminations: Arc<AtomicUsize>,
    }

    impl PipelineStage for CountingStage {
        fn name(&self) -> &'static str {
            self.name
        }

        fn terminate(&mut self) {
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn fake_pipeline() -> (Pipeline, flume::Sender<Packet>, Vec<Arc<AtomicUsize>>) {
        let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let stages: Vec<Box<dyn PipelineStage>> = ["source", "ffmpeg", "opus-encoder"]
            .into_iter()
            .zip(&counters)
            .map(|(name, counter)| {
                Box::new(CountingStage {
                    name,
                    terminations: counter.clone(),
                }) as Box<dyn PipelineStage>
            })
            .collect();
        let (tx, rx) = flume::bounded(8);
        (Pipeline::new(stages, rx), tx, counters)
    }

    fn counts(counters: &[Arc<AtomicUsize>]) -> Vec<usize> {
        counters.iter().map(|c| c.load(Ordering::SeqCst)).collect()
    }

    #[tokio::test]
    async fn output_error_terminates_every_stage_once() {
        let (pipeline, tx, counters) = fake_pipeline();
        let handle = pipeline.handle();
        let mut stream = pipeline.into_stream();

        tx.send_async(Ok(Bytes::from_static(b"frame"))).await.unwrap();
        tx.send_async(Err(PipelineError::Encoder("boom".into()))).await.unwrap();

        assert!(matches!(stream.next().await, Some(Ok(_))));
        assert_eq!(counts(&counters), vec![0, 0, 0]);

        assert!(matches!(stream.next().await, Some(Err(_))));
        assert_eq!(counts(&counters), vec![1, 1, 1]);
        assert!(handle.is_terminated());

        assert!(stream.next().await.is_none());
        assert!(!handle.terminate());
        drop(stream);
        assert_eq!(counts(&counters), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn stream_close_terminates_every_stage_once() {
        let (pipeline, tx, counters) = fake_pipeline();
        let mut stream = pipeline.into_stream();

        drop(tx);
        assert!(stream.next().await.is_none());
        assert_eq!(counts(&counters), vec![1, 1, 1]);

        drop(stream);
        assert_eq!(counts(&counters), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn explicit_terminate_then_drop_is_single_teardown() {
        let (pipeline, _tx, counters) = fake_pipeline();
        let handle = pipeline.handle();

        assert!(handle.terminate());
        assert!(!handle.terminate());
        drop(pipeline);
        assert_eq!(counts(&counters), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn dropping_an_unread_stream_tears_down() {
        let (pipeline, _tx, counters) = fake_pipeline();
        drop(pipeline);
        assert_eq!(counts(&counters), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn pcm_is_encoded_frame_by_frame() {
        let encoder = Encoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio).unwrap();
        // Two full frames plus half a frame of silence.
        let pcm = vec![0u8; PCM_FRAME_BYTES * 2 + PCM_FRAME_BYTES / 2];
        let (tx, rx) = flume::bounded(8);

        assert!(encode_pcm(std::io::Cursor::new(pcm), encoder, &tx).await);

        let packets: Vec<Packet> = rx.drain().collect();
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| matches!(p, Ok(bytes) if !bytes.is_empty())));
    }

    #[tokio::test]
    async fn failing_process_surfaces_its_exit_and_stderr() {
        let args = vec!["-c".to_string(), "echo bad input >&2; exit 1".to_string()];
        let pipeline = Pipeline::spawn("sh", &args, None, 4, 96_000).unwrap();
        let handle = pipeline.handle();
        let mut stream = pipeline.into_stream();

        match stream.next().await {
            Some(Err(PipelineError::ProcessExit { stderr, status, .. })) => {
                assert!(!status.success());
                assert!(stderr.contains("bad input"));
            }
            other => panic!("expected process exit error, got {:?}", other.map(|p| p.is_ok())),
        }
        assert!(handle.is_terminated());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn clean_process_exit_ends_the_stream() {
        let args = vec!["-c".to_string(), "exit 0".to_string()];
        let mut stream = Pipeline::spawn("sh", &args, None, 4, 96_000).unwrap().into_stream();

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stderr_tail_keeps_the_last_lines() {
        let text: String = (1..=12).map(|n| format!("line {}\n\n", n)).collect();
        let tail = stderr_tail(std::io::Cursor::new(text.into_bytes())).await;

        assert_eq!(tail, "line 5 | line 6 | line 7 | line 8 | line 9 | line 10 | line 11 | line 12");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let result = Pipeline::spawn("definitely-not-ffmpeg-xyz", &[], None, 4, 96_000);
        assert!(matches!(result, Err(PipelineError::Spawn { .. })));
    }
}
