//! The signature block inserted after the closing section.
//!
//! Names are template placeholders, resolved by the final substitution pass
//! together with the rest of the context.

/// Role of one line in the block; the document layer styles each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureLineKind {
    Blank,
    Instruction,
    /// Signer name placeholder, highlighted until resolved.
    Name,
    Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureLine {
    pub kind: SignatureLineKind,
    pub text: &'static str,
}

const fn line(kind: SignatureLineKind, text: &'static str) -> SignatureLine {
    SignatureLine { kind, text }
}

const BLANK: SignatureLine = line(SignatureLineKind::Blank, "");

/// Text colour (RGB hex) of [`SignatureLineKind::Name`] lines.
pub const NAME_COLOR: &str = "C00000";

pub const SIGNATURE_BLOCK: &[SignatureLine] = &[
    BLANK,
    line(
        SignatureLineKind::Instruction,
        "Submete-se o presente relatório à consideração superior.",
    ),
    line(SignatureLineKind::Instruction, "Teresina, {{ data_atual }}."),
    BLANK,
    BLANK,
    line(SignatureLineKind::Name, "{{ auditor_responsavel }}"),
    line(SignatureLineKind::Role, "Auditor(a) de Controle Externo"),
    BLANK,
    BLANK,
    line(SignatureLineKind::Name, "{{ chefe_divisao }}"),
    line(SignatureLineKind::Role, "Chefe da Divisão"),
    BLANK,
    BLANK,
    line(SignatureLineKind::Name, "{{ diretor }}"),
    line(SignatureLineKind::Role, "Diretor(a)"),
];

/// Context keys the block expects to be filled.
pub fn placeholder_keys() -> Vec<&'static str> {
    SIGNATURE_BLOCK
        .iter()
        .filter_map(|line| {
            let inner = line.text.split_once("{{")?.1.split_once("}}")?.0;
            Some(inner.trim())
        })
        .collect()
}
