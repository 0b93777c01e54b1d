//! ASCII tree rendering for a project's stages and resources.

use crate::models::{Project, Stage};

const DEFAULT_STAGE: char = '●';
const STAGE: char = '○';
const FUNCTION: char = 'λ';
const SITE: char = '◆';

struct TreeNode {
    symbol: Option<char>,
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(symbol: char, label: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol),
            label: label.into(),
            children: Vec::new(),
        }
    }
}

/// Render a project's stages with their functions and public sites.
///
/// Example output:
/// ```text
/// shop
/// ├── ● dev @ local
/// │   ├── λ checkout
/// │   └── ◆ www
/// └── ○ prod @ eu-node
/// ```
pub fn render_project(project: &Project) -> String {
    let root = TreeNode {
        symbol: None,
        label: project.name.clone(),
        children: project.stages.iter().map(stage_node).collect(),
    };
    let mut output = String::new();
    render_node(&mut output, &root, "", true, true);
    output
}

fn stage_node(stage: &Stage) -> TreeNode {
    let symbol = if stage.default { DEFAULT_STAGE } else { STAGE };
    let mut label = format!("{} @ {}", stage.name, stage.node);
    if let Some(rest) = stage.rest_endpoint() {
        label.push_str(&format!(" ({rest})"));
    }

    let functions = stage.functions.iter().map(|f| TreeNode::leaf(FUNCTION, &f.name));
    let sites = stage.public.iter().map(|s| TreeNode::leaf(SITE, &s.name));
    TreeNode {
        symbol: Some(symbol),
        label,
        children: functions.chain(sites).collect(),
    }
}

/// Recursively render a node and its children.
fn render_node(output: &mut String, node: &TreeNode, prefix: &str, is_last: bool, is_root: bool) {
    if is_root {
        output.push_str(&node.label);
        output.push('\n');
    } else {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
        if let Some(symbol) = node.symbol {
            output.push(symbol);
            output.push(' ');
        }
        output.push_str(&node.label);
        output.push('\n');
    }

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}
