//! value generators
//!
//! A block line `<?NAME` opens a generator region, terminated by a line
//! whose first token is `?>`. The body lines between the two are handed
//! verbatim to the generator registered under `NAME`; whatever it returns
//! becomes one generated line in the expanded block.
//!
//! Generators are the only programmable escape hatch in the format. They
//! are host-registered callbacks, never embedded code from the parsed
//! files, so a configuration tree alone cannot cause arbitrary execution.
use crate::collection::Collection;
use crate::error::Result;

pub trait Generator {
    fn generate(&self, body: &[String], collection: &Collection) -> Result<String>;
}

// blanket impl for closures
impl<F> Generator for F
where
    F: Fn(&[String], &Collection) -> Result<String>,
{
    fn generate(&self, body: &[String], collection: &Collection) -> Result<String> {
        self(body, collection)
    }
}

#[derive(Default)]
pub struct GeneratorRegistry {
    generators: indexmap::IndexMap<String, Box<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn register(&mut self, name: impl Into<String>, generator: impl Generator + 'static) {
        let name = name.into();
        tracing::debug!(%name, "registering generator");
        self.generators.insert(name, Box::new(generator));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Generator> {
        self.generators.get(name).map(|generator| generator.as_ref())
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.generators.keys())
            .finish()
    }
}
