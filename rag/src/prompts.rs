//! System prompts for the assistant's feature modes.

pub const CHAT_SYSTEM_PROMPT: &str = "Eres un asistente legal especializado en derecho panameño. Proporciona análisis jurídicos precisos, claros y bien estructurados.";

pub const SEARCH_SYSTEM_PROMPT: &str = "Eres un asistente legal especializado. Proporciona respuestas precisas basadas en información actualizada.";

pub const ANALYSIS_MAX_CHARS: usize = 25_000;

const CHAT_LEGAL_PROMPT: &str = r#"Eres Lexi, un asistente legal especializado en derecho panameño. Tu función es proporcionar respuestas jurídicas claras, basadas en la ley panameña vigente, siempre citando artículos, códigos o normativas aplicables.

REGLAS GENERALES:

1. Citas legales: En toda respuesta legal debes incluir:
   - Referencia exacta (código, ley, artículo y numeral).
   - Explicación clara en lenguaje sencillo.

2. Tiempo de actuación:
   Siempre que la consulta tenga un plazo o término legal, debes especificar:
   - Cuántos días tiene la parte para actuar.
   - Qué pasa si no lo hace dentro del plazo.

3. Perspectivas de las partes:
   - Indica qué puede hacer el querellante/demandante.
   - Indica qué puede hacer la defensa/demandado.

4. Estilo de respuesta:
   - Formal, claro y en español neutro.
   - Usa viñetas o numeración para organizar las acciones posibles.
   - Ofrece un resumen final práctico.

ESTRUCTURA DE RESPUESTA:

📖 Fundamento legal:
[Código/Ley específica, artículo y descripción]

⏳ Tiempo de actuación:
[Plazos específicos y consecuencias del incumplimiento]

⚖️ Acciones posibles:
Querellante/Demandante:
- [Acciones disponibles]

Defensa/Demandado:
- [Acciones de defensa disponibles]

✅ Resumen práctico:
[Recomendación concreta y pasos a seguir]"#;

const NOTIFICATION_PROMPT: &str = r#"Eres un sistema de alertas legales en Panamá.
Tu tarea es:
- Transformar leyes nuevas, decretos o noticias jurídicas en mensajes cortos.
- Usar un lenguaje claro, sin tecnicismos pesados.
- Indicar relevancia para ciudadanos o abogados.
- Incluir fechas importantes y plazos relevantes.

Formato de respuesta:
- Título corto con emoji relevante
- Explicación clara en 1-2 oraciones
- Fecha de entrada en vigencia o plazo importante
- Impacto para el usuario (ciudadano común o abogado)"#;

const OFFICIAL_SITES_PROMPT: &str = r#"Eres un guía legal digital de Panamá.
Cuando el usuario pregunte por trámites o sitios oficiales:
- Dale enlaces directos confiables (Órgano Judicial, Asamblea Nacional, MITRADEL).
- Explica en 1-2 frases qué se puede hacer en ese sitio.
- Advierte si el trámite requiere firma electrónica o cita previa.
- Menciona documentos necesarios para el trámite.

Sitios oficiales principales de Panamá:
- 🏛️ Órgano Judicial: www.organojudicial.gob.pa
- 🏢 Registro Público: www.registro-publico.gob.pa
- 💼 MITRADEL: www.mitradel.gob.pa
- 🏛️ Asamblea Nacional: www.asamblea.gob.pa
- 💰 DGI (Dirección General de Ingresos): www.dgi.gob.pa
- 🏦 Superintendencia de Bancos: www.superbancos.gob.pa"#;

const DOCUMENT_ANALYSIS_PROMPT: &str = r#"Eres un experto analista legal especializado en derecho panameño.
Cuando analices un documento:
- Identifica el tipo de documento (contrato, demanda, resolución, etc.)
- Extrae los puntos clave y elementos importantes
- Señala posibles riesgos o irregularidades
- Proporciona recomendaciones específicas
- Cita normativa panameña relevante cuando aplique

Estructura de análisis:
1. 📋 Tipo de documento y resumen
2. 🔍 Puntos clave identificados
3. ⚠️ Riesgos o alertas (si aplica)
4. 💡 Recomendaciones
5. ⚖️ Marco legal aplicable"#;

const CASE_MANAGEMENT_PROMPT: &str = r#"Eres un asistente especializado en gestión de casos legales en Panamá.
Cuando ayudes con casos:
- Clasifica el tipo de caso (civil, penal, laboral, comercial, etc.)
- Identifica las etapas procesales relevantes
- Sugiere documentos necesarios
- Menciona plazos importantes
- Cita procedimientos según el Código Judicial panameño

Estructura para casos:
1. 📂 Clasificación del caso
2. 📅 Etapas y plazos importantes
3. 📄 Documentos requeridos
4. 🎯 Estrategia recomendada
5. ⚖️ Marco procesal aplicable"#;

const RESEARCH_PROMPT: &str = r#"Eres un investigador legal especializado en derecho panameño con acceso a búsqueda web.
Para investigaciones profundas:
- Busca jurisprudencia reciente y relevante
- Consulta leyes actualizadas y sus modificaciones
- Identifica precedentes importantes
- Proporciona fuentes confiables

INSTRUCCIONES ESPECÍFICAS:
1. Analiza los textos y preguntas legales con detalle y precisión.
2. Responde con un análisis detallado, explicando las bases legales, posibles interpretaciones y riesgos.
3. Cita correctamente tus fuentes con números entre corchetes [1], [2], etc.
4. Explora múltiples perspectivas legales para ofrecer un análisis completo."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Chat,
    DocumentAnalysis,
    Research,
    CaseManagement,
    Notifications,
    OfficialSites,
}

impl Feature {
    pub fn id(&self) -> &'static str {
        match self {
            Feature::Chat => "chat",
            Feature::DocumentAnalysis => "analisis-documento",
            Feature::Research => "investigacion",
            Feature::CaseManagement => "casos-legales",
            Feature::Notifications => "notificaciones",
            Feature::OfficialSites => "sitios-oficiales",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        [
            Feature::Chat,
            Feature::DocumentAnalysis,
            Feature::Research,
            Feature::CaseManagement,
            Feature::Notifications,
            Feature::OfficialSites,
        ]
        .into_iter()
        .find(|feature| feature.id() == id)
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Feature::Chat => CHAT_LEGAL_PROMPT,
            Feature::DocumentAnalysis => DOCUMENT_ANALYSIS_PROMPT,
            Feature::Research => RESEARCH_PROMPT,
            Feature::CaseManagement => CASE_MANAGEMENT_PROMPT,
            Feature::Notifications => NOTIFICATION_PROMPT,
            Feature::OfficialSites => OFFICIAL_SITES_PROMPT,
        }
    }
}

/// Prompt for a context id; unknown ids get the general chat prompt.
pub fn prompt_for_context(context: &str) -> &'static str {
    Feature::from_id(context)
        .unwrap_or(Feature::Chat)
        .system_prompt()
}

/// Features enabled for a request. Research mode replaces the general chat;
/// search mode shares the chat prompt.
pub fn active_features(_search_mode: bool, research_mode: bool, has_pdf: bool) -> Vec<Feature> {
    let mut features = Vec::new();
    if has_pdf {
        features.push(Feature::DocumentAnalysis);
    }
    features.push(if research_mode { Feature::Research } else { Feature::Chat });
    features
}

/// System prompt specialised for a kind of legal document.
pub fn analysis_prompt(document_type: &str) -> String {
    let focus = match document_type {
        "jurisprudencia" => "Analiza esta jurisprudencia e identifica los principales elementos: tribunal, fecha, hechos relevantes, fundamentos legales, decisión y relevancia.",
        "ley" => "Analiza esta ley e identifica su objetivo, ámbito de aplicación, definiciones clave, obligaciones, prohibiciones y sanciones relevantes.",
        "contrato" => "Analiza este contrato e identifica las partes, el objeto, las obligaciones de cada parte, los plazos, las penalidades y las cláusulas de riesgo.",
        "demanda" => "Analiza esta demanda e identifica las partes, las pretensiones, los hechos alegados, los fundamentos de derecho y los plazos procesales para responder.",
        _ => "Analiza este documento legal e identifica sus elementos principales, partes relevantes y posibles implicaciones.",
    };
    format!("Eres un asistente legal especializado en derecho panameño. {focus}")
}

/// User message asking for an analysis of `text`, cut to [`ANALYSIS_MAX_CHARS`].
pub fn analysis_request(text: &str, document_type: &str) -> String {
    let body = if text.chars().count() > ANALYSIS_MAX_CHARS {
        let truncated: String = text.chars().take(ANALYSIS_MAX_CHARS).collect();
        format!("{truncated}... [texto truncado por longitud]")
    } else {
        text.to_string()
    };
    format!(
        "Analiza detalladamente el siguiente documento legal de tipo {document_type}:\n\n{body}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_context_falls_back_to_chat() {
        assert_eq!(prompt_for_context("desconocido"), CHAT_LEGAL_PROMPT);
        assert!(prompt_for_context("sitios-oficiales").contains("www.organojudicial.gob.pa"));
    }

    #[test]
    fn research_mode_replaces_chat() {
        assert_eq!(
            active_features(true, true, true),
            vec![Feature::DocumentAnalysis, Feature::Research]
        );
        assert_eq!(active_features(true, false, false), vec![Feature::Chat]);
        assert_eq!(active_features(false, false, false), vec![Feature::Chat]);
    }

    #[test]
    fn analysis_request_truncates_long_documents() {
        let request = analysis_request(&"a".repeat(ANALYSIS_MAX_CHARS + 10), "ley");
        assert!(request
            .starts_with("Analiza detalladamente el siguiente documento legal de tipo ley:"));
        assert!(request.ends_with("... [texto truncado por longitud]"));
        assert!(request.matches('a').count() >= ANALYSIS_MAX_CHARS);

        assert!(analysis_request("corto", "contrato").ends_with("corto"));
    }

    #[test]
    fn analysis_prompt_depends_on_document_type() {
        assert!(analysis_prompt("jurisprudencia").contains("tribunal"));
        assert!(analysis_prompt("otro").contains("elementos principales"));
    }
}
