//! Front-ends that compile program source into a [`crate::rung::Rung`].

pub mod codegen;
pub mod il;
pub mod ld;
pub mod tree;

use crate::error::CompileResult;
use crate::rung::Rung;

/// The front-end selected by a program source file's extension
/// (spec.md §6: `.il` -> IL parser, `.ld` -> LD parser).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Il,
    Ld,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "il" => Some(Language::Il),
            "ld" => Some(Language::Ld),
            _ => None,
        }
    }
}

/// Compile `source` with the front-end named by `lang`.
pub fn compile(lang: Language, source: &str) -> CompileResult<Rung> {
    match lang {
        Language::Il => il::parse_program(source),
        Language::Ld => codegen::compile(source),
    }
}
