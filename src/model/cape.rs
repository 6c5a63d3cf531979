//! Cape catalogue and skin model variants understood by the generation backend

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arm model of a skin texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinVariant {
    #[default]
    Classic,
    Slim,
}

impl SkinVariant {
    /// Map a texture metadata `model` tag; anything unrecognised is classic
    pub fn from_model(model: &str) -> Self {
        match model.to_ascii_lowercase().as_str() {
            "slim" | "alex" => SkinVariant::Slim,
            _ => SkinVariant::Classic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkinVariant::Classic => "classic",
            SkinVariant::Slim => "slim",
        }
    }
}

impl fmt::Display for SkinVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! cape_types {
    ($($variant:ident => $id:literal, $name:literal;)*) => {
        /// Capes the generation backend can composite
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CapeType {
            $($variant,)*
        }

        impl CapeType {
            pub const ALL: &'static [CapeType] = &[$(CapeType::$variant,)*];

            /// Wire identifier
            pub fn id(&self) -> &'static str {
                match self {
                    $(CapeType::$variant => $id,)*
                }
            }

            pub fn display_name(&self) -> &'static str {
                match self {
                    $(CapeType::$variant => $name,)*
                }
            }
        }
    };
}

cape_types! {
    Vanilla => "vanilla", "Vanilla";
    Minecon2011 => "minecon_2011", "MineCon 2011";
    Minecon2012 => "minecon_2012", "MineCon 2012";
    Minecon2013 => "minecon_2013", "MineCon 2013";
    Minecon2015 => "minecon_2015", "MineCon 2015";
    Minecon2016 => "minecon_2016", "MineCon 2016";
    Mojang => "mojang", "Mojang";
    MojangClassic => "mojang_classic", "Mojang Classic";
    MojangStudios => "mojang_studios", "Mojang Studios";
    RealmsMapmaker => "realms_mapmaker", "Realms Mapmaker";
    Cobalt => "cobalt", "Cobalt";
    Scrolls => "scrolls", "Scrolls";
    Translator => "translator", "Translator";
    MillionthCustomer => "millionth_customer", "Millionth Customer";
    Prismarine => "prismarine", "Prismarine";
    Birthday => "birthday", "Birthday";
    Migrator => "migrator", "Migrator";
    CherryBlossom => "cherry_blossom", "Cherry Blossom";
    Anniversary15th => "anniversary_15th", "15th Anniversary";
}

impl CapeType {
    /// Case-insensitive lookup by wire identifier
    pub fn from_id(id: &str) -> Option<Self> {
        let wanted = id.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|cape| cape.id().eq_ignore_ascii_case(wanted))
    }

    pub fn all_ids() -> Vec<&'static str> {
        Self::ALL.iter().map(CapeType::id).collect()
    }
}

impl fmt::Display for CapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cape_lookup_is_case_insensitive() {
        assert_eq!(CapeType::from_id("MINECON_2011"), Some(CapeType::Minecon2011));
        assert_eq!(CapeType::from_id(" cherry_blossom "), Some(CapeType::CherryBlossom));
        assert_eq!(CapeType::from_id("nope"), None);
        assert_eq!(CapeType::ALL.len(), 19);
    }

    #[test]
    fn test_variant_from_model() {
        assert_eq!(SkinVariant::from_model("alex"), SkinVariant::Slim);
        assert_eq!(SkinVariant::from_model("SLIM"), SkinVariant::Slim);
        assert_eq!(SkinVariant::from_model("default"), SkinVariant::Classic);
    }
}
