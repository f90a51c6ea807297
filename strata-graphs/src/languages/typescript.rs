use super::ecma::ecma_support;

#[derive(Debug)]
pub struct TypeScriptSupport;

#[derive(Debug)]
pub struct TsxSupport;

ecma_support!(
    TypeScriptSupport,
    "typescript",
    &["ts", "mts", "cts"],
    tree_sitter_typescript::LANGUAGE_TYPESCRIPT
);

ecma_support!(TsxSupport, "tsx", &["tsx"], tree_sitter_typescript::LANGUAGE_TSX);

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::extract::{SourceUnit, extract_source};
    use crate::ir::{FileExtraction, RelationKind};
    use crate::languages::LanguageSupport;

    fn extract(lang: &dyn LanguageSupport, path: &str, source: &str) -> FileExtraction {
        let unit = SourceUnit {
            path,
            relative: Path::new(path),
            text: source,
        };
        extract_source(lang, &unit).unwrap().into_extraction()
    }

    #[test]
    fn interfaces_and_heritage_clauses() {
        let source = r"
interface Named {
  name(): string;
}

abstract class Base {
  abstract run(): void;
}

export class Impl extends Base implements Named {
  private count = 0;
  name(): string {
    return 'x';
  }
  run(): void {
    this.name();
  }
}
";
        let ex = extract(&TypeScriptSupport, "src/impl.ts", source);
        assert!(ex.entity("src/impl.ts#Named@class").is_some());
        assert!(ex.entity("src/impl.ts#Named.name@function").is_some());
        assert!(ex.entity("src/impl.ts#Base.run@function").is_some());
        assert!(ex.entity("src/impl.ts#Impl.count@variable").is_some());

        let mut parents: Vec<_> = ex
            .relations_of(RelationKind::Inherits)
            .map(|r| (r.hint.as_ref().unwrap().text.as_str(), r.target.key()))
            .collect();
        parents.sort_unstable();
        assert_eq!(
            parents,
            vec![
                ("Base", Some("src/impl.ts#Base@class")),
                ("Named", Some("src/impl.ts#Named@class")),
            ]
        );
        let this_call = ex
            .relations_of(RelationKind::Calls)
            .find(|r| r.source == "src/impl.ts#Impl.run@function")
            .unwrap();
        assert_eq!(this_call.target.key(), Some("src/impl.ts#Impl.name@function"));
    }

    #[test]
    fn tsx_components_parse_with_the_tsx_grammar() {
        let source = r"
import { Button } from './button';

export const App = () => {
  return <Button label={format()} />;
};

function format(): string {
  return 'ok';
}
";
        let ex = extract(&TsxSupport, "web/App.tsx", source);
        assert!(ex.entity("web/App.tsx#App@function").is_some());
        let call = ex
            .relations_of(RelationKind::Calls)
            .find(|r| r.source == "web/App.tsx#App@function")
            .unwrap();
        assert_eq!(call.target.key(), Some("web/App.tsx#format@function"));
    }
}
