//! The enumerated field schema
//!
//! [`FIELD_SCHEMA`] is the authoritative list of (source label → coercer →
//! output key) triples applied by the normalizer. [`OUTPUT_ATTRIBUTES`]
//! declares the shape of a normalized record; [`validate_schema`] checks the
//! two agree and is run once at startup.
//!
//! Source labels are copied exactly as the list defines them, including
//! trailing spaces and punctuation (`"Canva de Fiscalização "`,
//! `"Data de Início da Ação:"`).

use std::collections::BTreeSet;

use crate::ConfigError;

/// Source field holding the `"<directorate>/<division>"` organizational unit.
pub const ORG_UNIT_LABEL: &str = "Divisão de Origem Ajustada";

/// How a raw field value becomes a normalized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercerKind {
    /// Value passed through with only a type-preserving conversion.
    Raw,
    /// Composite split, segment 1.
    Split,
    /// First element of a list, composite split, then person-name casing.
    FirstOfListName,
    /// `dd/mm/yyyy`.
    Date,
    /// Integer with default 0.
    Int,
    /// List elements split and joined.
    ListSplit,
    MultiSplitTrim,
    AlternateSplit,
    /// Every non-empty composite segment joined.
    SplitJoinAll,
    /// Brazilian Real.
    Currency,
    /// Float with default 0.0.
    Number,
    /// Composite split, then person-name casing.
    PersonName,
    /// Left side of the organizational unit, looked up in the directorate table.
    Directorate,
    /// Right side of the organizational unit, looked up in the division table.
    Division,
}

/// One row of the field schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub source: &'static str,
    pub kind: CoercerKind,
    pub output: &'static str,
}

const fn field(source: &'static str, kind: CoercerKind, output: &'static str) -> FieldSpec {
    FieldSpec {
        source,
        kind,
        output,
    }
}

use CoercerKind::*;

pub const FIELD_SCHEMA: &[FieldSpec] = &[
    field("ID", Raw, "id"),
    field("Unidades Fiscalizadas", Split, "unidades_fiscalizadas"),
    field("Criado por", FirstOfListName, "criado_por"),
    field(ORG_UNIT_LABEL, Raw, "divisao_origem_ajustada"),
    field(
        "Finalidade da ação de controle",
        Raw,
        "finalidade_acao_de_controle",
    ),
    field("Tipo de ação", Raw, "tipo_acao"),
    field("Nº Processo e-TCE", Split, "n_processo_eTCE"),
    field(
        "Nº Processo e-TCE: processoTipo",
        Split,
        "n_processo_eTCE_processo_tipo",
    ),
    field(
        "Situação da Ação de Controle",
        Split,
        "situacao_acao_de_controle",
    ),
    field("Data de Início da Ação:", Date, "data_inicio_acao"),
    field("Exercícios", SplitJoinAll, "exercicios"),
    field(
        "Data de conclusão da Ação de Controle",
        Date,
        "data_conclusão_acao_de_controle",
    ),
    field(
        "Tempestividade da Ação de Controle",
        Raw,
        "tempestividade_acao_de_controle",
    ),
    field(
        "Informe a metodologia do VRF:",
        Raw,
        "informe_metodologia_VRF",
    ),
    field("Volume de Recursos Fiscalizados (VRF):", Currency, "VRF"),
    field("Tema(s) do PACEX", Split, "temas_PACEX"),
    field(
        "Linha de Atuação: Descrição Tema",
        Split,
        "linha_atuacao_descrição_tema",
    ),
    field("Equipe de Fiscalização", ListSplit, "equipe_fiscalizacao"),
    field(
        "Benefícios Qualitativos",
        MultiSplitTrim,
        "beneficios_qualitativos",
    ),
    field("Técnicas Aplicadas", MultiSplitTrim, "tecnicas_aplicadas"),
    field("Benefícios efetivos:", Raw, "beneficios_efetivos"),
    field(
        "Proposta de benefícios potenciais ",
        Raw,
        "proposta_beneficios_potenciais",
    ),
    field(
        "Benefício não Financeiro Proposto",
        Raw,
        "beneficio_nao_financeiro_proposto",
    ),
    field(
        "Benefício não financeiro efetivo",
        Raw,
        "beneficio_nao_financeiro_efetivo",
    ),
    field(
        "Quantidade de medidas cautelares solicitadas;",
        Raw,
        "quantidade_medidas_cautelares_solicitadas",
    ),
    field(
        "Municípios visitados in loco",
        AlternateSplit,
        "municipios_visitados_in_loco",
    ),
    field(
        "Quantidade de visitas realizadas",
        Int,
        "quantidade_visitas_realizadas",
    ),
    field("Canva de Fiscalização ", Raw, "canva_fiscalizacao"),
    field("DVR", Raw, "DVR"),
    field("Matriz de Planejamento ", Raw, "matriz_planejamento"),
    field("Matriz de achados", Raw, "matriz_achados"),
    field(
        "Data de conclusão do Relatório Preliminar",
        Date,
        "data_conclusao_relatorio_preliminar",
    ),
    field(
        "Motivo do Encerramento da ação",
        Raw,
        "motivo_encerramento_acao",
    ),
    field("Encaminhamentos", MultiSplitTrim, "encaminhamentos"),
    field("Ação de controle ativa?", Raw, "acao__controle_ativa"),
    field("Dias em atividade", Int, "dias_em_atividade"),
    field("Anexos", Raw, "anexos"),
    field(
        "Ações de controle relacionadas",
        Split,
        "acoes_controle_relacionadas",
    ),
    field(
        "Ações de controle PAI: Objeto ",
        Raw,
        "acoes_controle_PAI_objeto",
    ),
    field(
        "Ações de controle PAI: VRF (R$)",
        Split,
        "acoes_controle_PAI_VRF",
    ),
    field("Modificado por", PersonName, "modificado_por"),
    field("Modificado", Date, "modificado_data"),
    field(
        "Valor das Licitações Analisadas",
        Number,
        "valor_licitacoes_analisadas",
    ),
    field(
        "Utilizou matriz de Risco da NUGEI?",
        Raw,
        "utilizou_matriz_risco_NUGEI",
    ),
    field("Trimestre de conclusão", Int, "trimestre_conclusao"),
    field("Criado", Date, "criado_data"),
    field(ORG_UNIT_LABEL, Directorate, "directorate"),
    field(ORG_UNIT_LABEL, Division, "division"),
];

/// Every attribute a normalized record carries.
pub const OUTPUT_ATTRIBUTES: &[&str] = &[
    "id",
    "unidades_fiscalizadas",
    "criado_por",
    "divisao_origem_ajustada",
    "finalidade_acao_de_controle",
    "tipo_acao",
    "n_processo_eTCE",
    "n_processo_eTCE_processo_tipo",
    "situacao_acao_de_controle",
    "data_inicio_acao",
    "exercicios",
    "data_conclusão_acao_de_controle",
    "tempestividade_acao_de_controle",
    "informe_metodologia_VRF",
    "VRF",
    "temas_PACEX",
    "linha_atuacao_descrição_tema",
    "equipe_fiscalizacao",
    "beneficios_qualitativos",
    "tecnicas_aplicadas",
    "beneficios_efetivos",
    "proposta_beneficios_potenciais",
    "beneficio_nao_financeiro_proposto",
    "beneficio_nao_financeiro_efetivo",
    "quantidade_medidas_cautelares_solicitadas",
    "municipios_visitados_in_loco",
    "quantidade_visitas_realizadas",
    "canva_fiscalizacao",
    "DVR",
    "matriz_planejamento",
    "matriz_achados",
    "data_conclusao_relatorio_preliminar",
    "motivo_encerramento_acao",
    "encaminhamentos",
    "acao__controle_ativa",
    "dias_em_atividade",
    "anexos",
    "acoes_controle_relacionadas",
    "acoes_controle_PAI_objeto",
    "acoes_controle_PAI_VRF",
    "modificado_por",
    "modificado_data",
    "valor_licitacoes_analisadas",
    "utilizou_matriz_risco_NUGEI",
    "trimestre_conclusao",
    "criado_data",
    "directorate",
    "division",
];

/// Output attribute holding the process type used for status resolution.
pub const PROCESS_TYPE_ATTRIBUTE: &str = "n_processo_eTCE_processo_tipo";

/// Check that `schema` produces exactly the attributes in `declared`, once each.
pub fn validate_schema(schema: &[FieldSpec], declared: &[&str]) -> Result<(), ConfigError> {
    let declared: BTreeSet<&str> = declared.iter().copied().collect();
    let mut seen = BTreeSet::new();

    for spec in schema {
        if !declared.contains(spec.output) {
            return Err(ConfigError::UnknownAttribute(spec.output.to_string()));
        }
        if !seen.insert(spec.output) {
            return Err(ConfigError::DuplicateAttribute(spec.output.to_string()));
        }
    }

    match declared.difference(&seen).next() {
        Some(missing) => Err(ConfigError::MissingAttribute(missing.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schema_is_complete() {
        assert!(validate_schema(FIELD_SCHEMA, OUTPUT_ATTRIBUTES).is_ok());
        assert_eq!(FIELD_SCHEMA.len(), OUTPUT_ATTRIBUTES.len());
        assert_eq!(OUTPUT_ATTRIBUTES.len(), 48);
    }

    #[test]
    fn test_validate_schema_missing_attribute() {
        // Arrange
        let schema = &FIELD_SCHEMA[..FIELD_SCHEMA.len() - 1];

        // Act
        let result = validate_schema(schema, OUTPUT_ATTRIBUTES);

        // Assert
        assert!(matches!(result, Err(ConfigError::MissingAttribute(ref a)) if a == "division"));
    }

    #[test]
    fn test_validate_schema_duplicate_attribute() {
        let schema = [field("A", Raw, "a"), field("B", Split, "a")];
        let result = validate_schema(&schema, &["a"]);
        assert!(matches!(result, Err(ConfigError::DuplicateAttribute(_))));
    }

    #[test]
    fn test_validate_schema_unknown_attribute() {
        let schema = [field("A", Raw, "a"), field("B", Raw, "b")];
        let result = validate_schema(&schema, &["a"]);
        assert!(matches!(result, Err(ConfigError::UnknownAttribute(ref a)) if a == "b"));
    }

    #[test]
    fn test_source_labels_keep_trailing_spaces() {
        let spec = FIELD_SCHEMA
            .iter()
            .find(|s| s.output == "proposta_beneficios_potenciais")
            .unwrap();
        assert_eq!(spec.source, "Proposta de benefícios potenciais ");
    }
}
