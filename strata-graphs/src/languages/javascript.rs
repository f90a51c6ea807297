use super::ecma::ecma_support;

#[derive(Debug)]
pub struct JavaScriptSupport;

ecma_support!(
    JavaScriptSupport,
    "javascript",
    &["js", "jsx", "mjs", "cjs"],
    tree_sitter_javascript::LANGUAGE
);
