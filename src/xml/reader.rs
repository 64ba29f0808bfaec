//! Bounded-lookahead token source.
//!
//! A dedicated thread drives the `quick-xml` tokenizer and feeds structural
//! events into a bounded channel, so file I/O and tokenization run ahead of
//! the orchestrator's consumption. Event order is preserved; the consumer
//! sees a blocking `next()` plus one-item pushback and a non-consuming
//! `peek()`.

use super::event::{Element, XmlEvent};
use crate::error::ImportError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::io::BufRead;
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

/// Default lookahead depth when none is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

type Item = Result<XmlEvent, String>;

pub struct TokenSource {
    rx: Receiver<Item>,
    pushback: Option<XmlEvent>,
    finished: bool,
    worker: Option<JoinHandle<()>>,
}

impl TokenSource {
    /// Spawn the tokenizer thread over any buffered reader.
    pub fn from_reader<R: BufRead + Send + 'static>(input: R, depth: usize) -> Self {
        let (tx, rx) = sync_channel::<Item>(depth.max(1));

        let worker = thread::spawn(move || {
            tokenize(input, &tx);
        });

        Self {
            rx,
            pushback: None,
            finished: false,
            worker: Some(worker),
        }
    }

    pub fn from_file(path: &Path, depth: usize) -> Result<Self, ImportError> {
        let file = fs::File::open(path)?;
        Ok(Self::from_reader(std::io::BufReader::new(file), depth))
    }

    /// Tokenize an in-memory document; used by tests and dry runs.
    pub fn from_string(document: &str, depth: usize) -> Self {
        Self::from_reader(std::io::Cursor::new(document.to_string().into_bytes()), depth)
    }

    /// Blocking pull of the next event. After the end of the document (or a
    /// tokenizer error, which is returned once), yields `EndOfDocument`
    /// forever.
    pub fn next(&mut self) -> Result<XmlEvent, ImportError> {
        if let Some(event) = self.pushback.take() {
            return Ok(event);
        }

        if self.finished {
            return Ok(XmlEvent::EndOfDocument);
        }

        match self.rx.recv() {
            Ok(Ok(event)) => {
                if event.is_end() {
                    self.finished = true;
                }
                Ok(event)
            }
            Ok(Err(message)) => {
                self.finished = true;
                Err(ImportError::Xml(message))
            }
            Err(_) => {
                self.finished = true;
                Ok(XmlEvent::EndOfDocument)
            }
        }
    }

    /// Look at the next event without consuming it.
    pub fn peek(&mut self) -> Result<XmlEvent, ImportError> {
        if let Some(event) = &self.pushback {
            return Ok(event.clone());
        }
        let event = self.next()?;
        self.pushback = Some(event.clone());
        Ok(event)
    }

    /// Return one event to the front of the stream. At most one event may be
    /// pushed back at a time.
    pub fn push_back(&mut self, event: XmlEvent) {
        assert!(self.pushback.is_none(), "pushback slot already occupied");
        self.pushback = Some(event);
    }

    /// Consume events until the close tag for `name` (inclusive), balancing
    /// any nested elements of the same name. Used to realign the stream
    /// after a fatal-object error.
    pub fn skip_to_close(&mut self, name: &str) -> Result<(), ImportError> {
        let mut nesting = 0usize;
        loop {
            let event = self.next()?;
            if event.matches(name) {
                if let Some(el) = event.as_element() {
                    if !el.is_empty() {
                        nesting += 1;
                    }
                }
            } else if event.matches_close(name) {
                if nesting == 0 {
                    return Ok(());
                }
                nesting -= 1;
            } else if event.is_end() {
                return Err(ImportError::UnexpectedEnd(name.to_string()));
            }
        }
    }
}

impl Drop for TokenSource {
    fn drop(&mut self) {
        // Unblock the worker if we stop consuming early.
        drop(std::mem::replace(&mut self.rx, {
            let (_tx, rx) = sync_channel(1);
            rx
        }));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn element_from(start: &BytesStart<'_>, empty: bool) -> Result<Element, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attrs.push((key, value));
    }

    Ok(Element::new(name, attrs, empty))
}

/// Tokenizer loop run on the worker thread. Whitespace-only text is dropped;
/// a self-closing element is emitted as an open event followed by a
/// synthetic close so consumers see a uniform stream.
fn tokenize<R: BufRead>(input: R, tx: &SyncSender<Item>) {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().check_end_names = true;
    let mut buf = Vec::new();

    loop {
        let outcome = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => match element_from(&start, false) {
                Ok(el) => tx.send(Ok(XmlEvent::Open(el))),
                Err(message) => {
                    let _ = tx.send(Err(message));
                    return;
                }
            },
            Ok(Event::Empty(start)) => match element_from(&start, true) {
                Ok(el) => {
                    let name = el.name().to_string();
                    if tx.send(Ok(XmlEvent::Open(el))).is_err() {
                        return;
                    }
                    tx.send(Ok(XmlEvent::Close(name)))
                }
                Err(message) => {
                    let _ = tx.send(Err(message));
                    return;
                }
            },
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                tx.send(Ok(XmlEvent::Close(name)))
            }
            Ok(Event::Text(text)) => match text.unescape() {
                Ok(decoded) => {
                    let trimmed = decoded.trim();
                    if trimmed.is_empty() {
                        Ok(())
                    } else {
                        tx.send(Ok(XmlEvent::Text(trimmed.to_string())))
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.to_string()));
                    return;
                }
            },
            Ok(Event::CData(data)) => {
                let decoded = String::from_utf8_lossy(&data).into_owned();
                tx.send(Ok(XmlEvent::Text(decoded)))
            }
            Ok(Event::Eof) => {
                let _ = tx.send(Ok(XmlEvent::EndOfDocument));
                return;
            }
            Ok(_) => Ok(()), // declarations, comments, processing instructions
            Err(e) => {
                let _ = tx.send(Err(format!(
                    "parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
                return;
            }
        };

        if outcome.is_err() {
            // Receiver dropped; stop tokenizing.
            return;
        }

        buf.clear();
    }
}
