use std::path::PathBuf;

use clap::Parser;
use rlm_agent::{FieldType, OutputSchema};

/// rlm: answer questions about a large document by letting a model explore
/// it with code.
#[derive(Parser, Debug)]
#[command(name = "rlm", version, about)]
pub struct Args {
    /// Document preloaded into the session as `doc`.
    #[arg(short = 'd', long)]
    pub document: PathBuf,

    /// What the model should do with the document.
    #[arg(short = 'i', long)]
    pub instructions: String,

    /// Output field as `name` or `name:type` (string, number, integer,
    /// boolean, array, object). Repeatable. Defaults to `answer:string`.
    #[arg(short = 'f', long = "field", value_parser = parse_field)]
    pub fields: Vec<FieldArg>,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

/// One `--field` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldArg {
    pub name: String,
    pub field_type: FieldType,
}

pub fn parse() -> Args {
    Args::parse()
}

fn parse_field(raw: &str) -> Result<FieldArg, String> {
    let (name, field_type) = match raw.split_once(':') {
        Some((name, ty)) => (name.trim(), ty.parse::<FieldType>()?),
        None => (raw.trim(), FieldType::String),
    };
    if name.is_empty() {
        return Err(format!("field '{raw}' has no name"));
    }
    Ok(FieldArg {
        name: name.to_string(),
        field_type,
    })
}

impl Args {
    /// Output schema from the `--field` arguments.
    pub fn schema(&self) -> OutputSchema {
        if self.fields.is_empty() {
            return OutputSchema::new().field("answer", FieldType::String, "The answer to the task");
        }
        self.fields.iter().fold(OutputSchema::new(), |schema, field| {
            schema.field(
                field.name.clone(),
                field.field_type,
                format!("Value for '{}'", field.name),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_args() {
        let args =
            Args::try_parse_from(["rlm", "--document", "notes.txt", "--instructions", "Summarize"])
                .unwrap();
        assert_eq!(args.document, PathBuf::from("notes.txt"));
        assert_eq!(args.instructions, "Summarize");
        assert!(args.fields.is_empty());
        assert!(args.config.is_none());
    }

    #[test]
    fn default_schema_has_answer_field() {
        let args = Args::try_parse_from(["rlm", "-d", "a.txt", "-i", "x"]).unwrap();
        let schema = args.schema();
        assert_eq!(schema.fields().len(), 1);
        assert_eq!(schema.fields()[0].name, "answer");
    }

    #[test]
    fn parses_typed_fields() {
        let args = Args::try_parse_from([
            "rlm", "-d", "a.txt", "-i", "x", "--field", "title", "--field", "pages:int",
        ])
        .unwrap();
        assert_eq!(
            args.fields,
            vec![
                FieldArg {
                    name: "title".into(),
                    field_type: FieldType::String
                },
                FieldArg {
                    name: "pages".into(),
                    field_type: FieldType::Integer
                },
            ]
        );
        assert!(args.schema().validate().is_ok());
    }

    #[test]
    fn rejects_bad_fields() {
        assert!(parse_field(":string").is_err());
        assert!(parse_field("x:tuple").is_err());
        assert!(Args::try_parse_from(["rlm", "-d", "a.txt", "-i", "x", "-f", "y:set"]).is_err());
    }

    #[test]
    fn document_and_instructions_are_required() {
        assert!(Args::try_parse_from(["rlm", "-i", "x"]).is_err());
        assert!(Args::try_parse_from(["rlm", "-d", "a.txt"]).is_err());
    }
}
