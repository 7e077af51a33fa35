//! Topics command implementation.

use crate::error::Result;
use crate::output::Formatter;
use concord_domain::TopicRegistry;

/// Execute the topics command.
pub fn execute_topics(formatter: &Formatter) -> Result<()> {
    let registry = TopicRegistry::contract_defaults();
    println!("{}", formatter.format_topics(&registry)?);
    Ok(())
}
