//! Words and their expansion markers.
//!
//! A word is a sequence of parts the lexer has already classified:
//! literal runs, quoted runs, parameter expansions, command and
//! arithmetic substitutions. Expansion walks the parts in order; quoting
//! survives as part structure so later phases (field splitting, globs)
//! know what to leave alone.

/// One shell word.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![WordPart::Literal(text.into())],
        }
    }

    /// The literal spelling, if the word is a single unquoted literal.
    /// Reserved words and assignment names are recognized this way.
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Literal(text)] => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// A classified span within a word.
#[derive(Clone, Debug, PartialEq)]
pub enum WordPart {
    /// Unquoted text: subject to tilde, field splitting and globs.
    Literal(String),
    /// Single-quoted text, fully verbatim.
    SingleQuoted(String),
    /// Double-quoted sequence: inner expansions run, no splitting/globs.
    DoubleQuoted(Vec<WordPart>),
    /// `$NAME`, `${NAME}`, `${NAME:-…}` and friends.
    Param(ParamExp),
    /// `$( … )`: raw source, parsed at expansion time.
    CmdSub(String),
    /// `` ` … ` ``: same as [`WordPart::CmdSub`], legacy spelling.
    Backquote(String),
    /// `$(( … ))`: raw arithmetic source.
    Arith(String),
}

/// A parameter expansion: name, optional array subscript, operator.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamExp {
    pub name: String,
    /// Raw subscript text for `${a[…]}`.
    pub index: Option<String>,
    pub op: ParamOp,
}

impl ParamExp {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
            op: ParamOp::Plain,
        }
    }
}

/// The `${…}` operator suite.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamOp {
    Plain,
    /// `${#NAME}` / `${#a[@]}`
    Length,
    /// `${NAME:-word}` (`colon`: also treat empty as unset)
    Default { word: Word, colon: bool },
    /// `${NAME:=word}`
    Assign { word: Word, colon: bool },
    /// `${NAME:+word}`
    Alt { word: Word, colon: bool },
    /// `${NAME:?message}`
    Error { word: Word, colon: bool },
    /// `${NAME#pat}` / `${NAME##pat}`
    RemovePrefix { pattern: Word, longest: bool },
    /// `${NAME%pat}` / `${NAME%%pat}`
    RemoveSuffix { pattern: Word, longest: bool },
    /// `${NAME/pat/rep}` / `${NAME//pat/rep}`
    Replace {
        pattern: Word,
        replacement: Word,
        all: bool,
    },
}
