use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::config::PiperConfig;
use super::error::PiperEngineError;

/// Start-of-utterance phoneme.
const BOS: char = '^';
/// End-of-utterance phoneme.
const EOS: char = '$';
/// Padding inserted after every phoneme.
const PAD: char = '_';

/// Location of the espeak-ng binary and its data directory.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    /// `None` runs `espeak-ng` from PATH
    pub bin_path: Option<PathBuf>,
    /// `None` uses espeak-ng's compiled-in data path
    pub data_path: Option<PathBuf>,
}

/// One sentence of input and the punctuation that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub text: String,
    pub terminator: Option<char>,
}

/// Split text into sentences on `.`, `!`, `?` and line breaks.
///
/// Decimal points between digits (`2.5`) do not end a sentence.
pub fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        let terminator = match ch {
            '.' | '!' | '?' if !is_decimal_point(text, idx, ch) => Some(Some(ch)),
            '\n' | '\r' => Some(None),
            _ => None,
        };

        match terminator {
            Some(terminator) => flush_sentence(&mut sentences, &mut current, terminator),
            None if ch.is_whitespace() => {
                if !current.is_empty() && !current.ends_with(' ') {
                    current.push(' ');
                }
            }
            None => current.push(ch),
        }
    }

    flush_sentence(&mut sentences, &mut current, None);
    sentences
}

fn flush_sentence(sentences: &mut Vec<Sentence>, current: &mut String, terminator: Option<char>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(Sentence {
            text: trimmed.to_string(),
            terminator,
        });
    }
    current.clear();
}

fn is_decimal_point(text: &str, idx: usize, ch: char) -> bool {
    if ch != '.' {
        return false;
    }

    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch.len_utf8()..].chars().next();

    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

/// Phonemize each sentence with espeak-ng, one IPA string per sentence.
///
/// The sentence terminator is appended so the model can shape intonation.
pub fn phonemize_sentences(
    sentences: &[Sentence],
    voice: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, PiperEngineError> {
    if sentences.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<&str> = sentences.iter().map(|s| s.text.as_str()).collect();
    let output = run_espeak(&texts.join("\n"), voice, espeak)?;
    let lines: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    // espeak-ng emits one line per input line in stdin mode, but may split
    // long clauses. Fall back to one invocation per sentence if it did.
    let phonemes: Vec<String> = if lines.len() == sentences.len() {
        lines.iter().map(|l| l.to_string()).collect()
    } else {
        texts
            .iter()
            .map(|text| -> Result<String, PiperEngineError> {
                let output = run_espeak(text, voice, espeak)?;
                Ok(output.lines().map(str::trim).collect::<Vec<_>>().join(" "))
            })
            .collect::<Result<_, _>>()?
    };

    Ok(phonemes
        .into_iter()
        .zip(sentences)
        .map(|(mut ipa, sentence)| {
            if let Some(terminator) = sentence.terminator {
                ipa.push(terminator);
            }
            ipa
        })
        .collect())
}

/// Map a phoneme string to model input ids.
///
/// Layout: `^`, then each known phoneme followed by `_`, then `$`.
/// Phonemes missing from the voice's map are skipped.
pub fn phoneme_ids(config: &PiperConfig, phonemes: &str) -> Vec<i64> {
    let pad = config.ids_for(PAD).unwrap_or(&[]);
    let mut ids = Vec::with_capacity(phonemes.chars().count() * 2 + 2);

    ids.extend_from_slice(config.ids_for(BOS).unwrap_or(&[]));
    for phoneme in phonemes.chars() {
        match config.ids_for(phoneme) {
            Some(phoneme_ids) => {
                ids.extend_from_slice(phoneme_ids);
                ids.extend_from_slice(pad);
            }
            None => log::debug!("Skipping unknown phoneme {phoneme:?}"),
        }
    }
    ids.extend_from_slice(config.ids_for(EOS).unwrap_or(&[]));
    ids
}

fn run_espeak(input: &str, voice: &str, espeak: &EspeakConfig) -> Result<String, PiperEngineError> {
    let mut args: Vec<String> = ["--ipa", "--stdin", "-q", "-v", voice]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
    if let Some(data_path) = &espeak.data_path {
        args.push(format!("--path={}", data_path.display()));
    }

    run_espeak_with(input, espeak, &args)
}

fn run_espeak_with(
    input: &str,
    espeak: &EspeakConfig,
    args: &[String],
) -> Result<String, PiperEngineError> {
    let bin = espeak
        .bin_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("espeak-ng"));

    let mut child = Command::new(bin)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PiperEngineError::EspeakNotFound
            } else {
                PiperEngineError::Io(e)
            }
        })?;

    // espeak-ng under-processes a final line without a terminator
    let payload = newline_terminated(input);
    let stdin = child.stdin.take();

    // stdin is fed from its own thread so a large payload cannot block
    // while espeak-ng waits for its stdout to be drained
    let (written, output) = std::thread::scope(|scope| {
        let writer = scope.spawn(move || -> std::io::Result<()> {
            match stdin {
                Some(mut stdin) => stdin.write_all(payload.as_bytes()),
                None => Ok(()),
            }
        });
        let output = child.wait_with_output();
        let written = writer.join().unwrap_or_else(|_| {
            Err(std::io::Error::other("espeak-ng stdin writer panicked"))
        });
        (written, output)
    });
    let output = output?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PiperEngineError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {stderr}",
            output.status.code()
        )));
    }

    written?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn newline_terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}
