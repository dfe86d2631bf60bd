//! Parameter maps and the parenthesised parameter-file text format.
//!
//! ```text
//! // comment
//! (Registration "MultiResolutionRegistration")
//! (NumberOfResolutions 3)
//! (Metric "AdvancedMeanSquares" "AdvancedNormalizedCorrelation")
//! ```
//!
//! Each parenthesised group is a key followed by zero or more values. Values
//! are kept as strings; quoted and bare values are equivalent.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Ordered map from parameter key to its list of string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap {
    entries: IndexMap<String, Vec<String>>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the parameter-file text format.
    pub fn parse(text: &str) -> Result<Self> {
        let mut map = Self::new();
        let mut tokens = Tokenizer::new(text);
        while let Some(token) = tokens.next_token()? {
            match token {
                Token::Open(line) => {
                    let key = match tokens.next_token()? {
                        Some(Token::Word(key, _)) => key,
                        Some(Token::Quoted(_, l)) | Some(Token::Open(l)) | Some(Token::Close(l)) => {
                            return Err(CoreError::Syntax {
                                line: l,
                                message: "expected a parameter name after '('".to_string(),
                            })
                        }
                        None => {
                            return Err(CoreError::Syntax {
                                line,
                                message: "unterminated parameter".to_string(),
                            })
                        }
                    };
                    let mut values = Vec::new();
                    loop {
                        match tokens.next_token()? {
                            Some(Token::Word(v, _)) | Some(Token::Quoted(v, _)) => values.push(v),
                            Some(Token::Close(_)) => break,
                            Some(Token::Open(l)) => {
                                return Err(CoreError::Syntax {
                                    line: l,
                                    message: format!("nested '(' inside parameter \"{key}\""),
                                })
                            }
                            None => {
                                return Err(CoreError::Syntax {
                                    line,
                                    message: format!("missing ')' for parameter \"{key}\""),
                                })
                            }
                        }
                    }
                    map.entries.insert(key, values);
                }
                Token::Word(word, line) | Token::Quoted(word, line) => {
                    return Err(CoreError::Syntax {
                        line,
                        message: format!("unexpected \"{word}\" outside parentheses"),
                    })
                }
                Token::Close(line) => {
                    return Err(CoreError::Syntax {
                        line,
                        message: "unbalanced ')'".to_string(),
                    })
                }
            }
        }
        Ok(map)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::file_io(path, e.to_string()))?;
        Self::parse(&text)
    }

    /// Render in the parameter-file format; numeric values stay bare, all
    /// other values are quoted.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, values) in &self.entries {
            out.push('(');
            out.push_str(key);
            for value in values {
                out.push(' ');
                if value.parse::<f64>().is_ok() {
                    out.push_str(value);
                } else {
                    out.push('"');
                    out.push_str(value);
                    out.push('"');
                }
            }
            out.push_str(")\n");
        }
        out
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_text()).map_err(|e| CoreError::file_io(path, e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn get_entry(&self, key: &str, entry: usize) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.get(entry)).map(String::as_str)
    }

    /// Entry `entry` of `key` converted to `T`; `Ok(None)` when absent.
    pub fn get_as<T>(&self, key: &str, entry: usize) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get_entry(key, entry) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| CoreError::invalid_value(key, entry, raw, e.to_string())),
        }
    }

    /// All entries of `key` converted to `T`; empty when absent.
    pub fn get_all_as<T>(&self, key: &str) -> Result<Vec<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(entry, raw)| {
                raw.parse::<T>()
                    .map_err(|e| CoreError::invalid_value(key, entry, raw.as_str(), e.to_string()))
            })
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of values stored for `key`.
    pub fn count(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, Vec::len)
    }

    /// Replace the values of `key`, keeping its position if it exists.
    pub fn set<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.entries
            .insert(key.into(), values.into_iter().map(|v| v.to_string()).collect());
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.entries.entry(key.into()).or_default().push(value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.shift_remove(key)
    }

    /// Copy every entry of `other`, overwriting existing keys.
    pub fn merge(&mut self, other: &ParameterMap) {
        for (key, values) in &other.entries {
            self.entries.insert(key.clone(), values.clone());
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ParameterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for ParameterMap {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

enum Token {
    Open(usize),
    Close(usize),
    Word(String, usize),
    Quoted(String, usize),
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            let Some(&c) = self.chars.peek() else {
                return Ok(None);
            };
            match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '/' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'/') {
                        while let Some(&c) = self.chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.chars.next();
                        }
                    } else {
                        let rest = self.word();
                        return Ok(Some(Token::Word(format!("/{rest}"), self.line)));
                    }
                }
                '(' => {
                    self.chars.next();
                    return Ok(Some(Token::Open(self.line)));
                }
                ')' => {
                    self.chars.next();
                    return Ok(Some(Token::Close(self.line)));
                }
                '"' => {
                    self.chars.next();
                    let start = self.line;
                    let mut value = String::new();
                    loop {
                        match self.chars.next() {
                            Some('"') => break,
                            Some('\n') | None => {
                                return Err(CoreError::Syntax {
                                    line: start,
                                    message: "unterminated quoted value".to_string(),
                                })
                            }
                            Some(c) => value.push(c),
                        }
                    }
                    return Ok(Some(Token::Quoted(value, start)));
                }
                _ => {
                    let word = self.word();
                    return Ok(Some(Token::Word(word, self.line)));
                }
            }
        }
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        word
    }
}
