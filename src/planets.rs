//! # Planet Catalog
//!
//! The bodies the pilot can select. Selecting one asks the agent for a short
//! briefing; a deep scan narrates over the voice link while the image renders.

use serde::Serialize;

/// One selectable planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Planet {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub atmosphere: &'static str,
}

pub const PLANETS: &[Planet] = &[
    Planet {
        id: "mercury",
        name: "Mercury",
        description: "The swift iron planet, scorched by the Sun and frozen in its shadows. Its cratered surface tells a violent history of bombardment.",
        kind: "Terrestrial",
        atmosphere: "Trace Exosphere",
    },
    Planet {
        id: "venus",
        name: "Venus",
        description: "A cautionary tale of the greenhouse effect gone wrong. Crushing atmospheric pressure and clouds of sulfuric acid hide a hellish volcanic landscape.",
        kind: "Terrestrial",
        atmosphere: "Super-Critical CO2",
    },
    Planet {
        id: "earth",
        name: "Earth",
        description: "The pale blue dot. A rare oasis of liquid water and life, shielded by a magnetic field and a nitrogen-oxygen atmosphere.",
        kind: "Terrestrial",
        atmosphere: "Nitrogen-Oxygen",
    },
    Planet {
        id: "mars",
        name: "Mars",
        description: "The Red Planet. A cold desert world that once flowed with water. Its iron-oxide rust dust coats a surface of extinct volcanoes and vast canyons.",
        kind: "Terrestrial",
        atmosphere: "Thin CO2",
    },
    Planet {
        id: "jupiter",
        name: "Jupiter",
        description: "The King of Planets. A colossus of hydrogen and helium, guarding the inner system. Its Great Red Spot is a storm that has raged for centuries.",
        kind: "Gas Giant",
        atmosphere: "Hydrogen-Helium",
    },
    Planet {
        id: "saturn",
        name: "Saturn",
        description: "The Jewel of the Solar System. Its magnificent ring system is a complex dance of ice and rock, orbiting a giant ball of gas.",
        kind: "Gas Giant",
        atmosphere: "Hydrogen-Helium",
    },
];

/// Look a planet up by id, ignoring case.
pub fn find_planet(id: &str) -> Option<&'static Planet> {
    PLANETS.iter().find(|planet| planet.id.eq_ignore_ascii_case(id.trim()))
}

impl Planet {
    /// Text turn sent to the agent when the pilot selects this planet.
    pub fn briefing_request(&self) -> String {
        format!("User selected {}. Provide a short 1-sentence briefing.", self.name)
    }

    /// Text turn that has the agent narrate while a deep scan renders.
    pub fn scan_narration(&self) -> String {
        format!(
            "Initiating deep visual scan of {}. Describe the surface details vividly while the image processes.",
            self.name
        )
    }

    /// Description handed to the image prompt.
    pub fn scan_subject(&self) -> String {
        format!(
            "{} planet surface, {}, {}, {}",
            self.name, self.description, self.kind, self.atmosphere
        )
    }
}
