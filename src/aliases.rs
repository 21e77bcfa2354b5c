//! City and state-name tables used to disambiguate free-text input.
//!
//! Both tables are plain data: an [`AliasTable`] is built once at start-up and
//! handed to the lookup components by reference.

use std::collections::HashMap;

/// Lower-cased city names and common abbreviations, mapped to their UF.
const CITY_ALIASES: &[(&str, &str)] = &[
    // São Paulo
    ("são paulo", "SP"),
    ("sao paulo", "SP"),
    ("sp", "SP"),
    ("campinas", "SP"),
    ("bauru", "SP"),
    ("santos", "SP"),
    ("sorocaba", "SP"),
    ("ribeirão preto", "SP"),
    ("ribeirao preto", "SP"),
    ("são josé dos campos", "SP"),
    ("sao jose dos campos", "SP"),
    ("osasco", "SP"),
    ("guarulhos", "SP"),
    ("piracicaba", "SP"),
    ("jundiaí", "SP"),
    ("jundiai", "SP"),
    ("marília", "SP"),
    ("marilia", "SP"),
    ("presidente prudente", "SP"),
    ("araçatuba", "SP"),
    ("aracatuba", "SP"),
    ("araraquara", "SP"),
    ("são carlos", "SP"),
    ("sao carlos", "SP"),
    ("franca", "SP"),
    ("botucatu", "SP"),
    // Rio de Janeiro
    ("rio de janeiro", "RJ"),
    ("rio", "RJ"),
    ("rj", "RJ"),
    ("niterói", "RJ"),
    ("niteroi", "RJ"),
    ("petrópolis", "RJ"),
    ("petropolis", "RJ"),
    ("nova iguaçu", "RJ"),
    ("nova iguacu", "RJ"),
    ("duque de caxias", "RJ"),
    // Minas Gerais
    ("belo horizonte", "MG"),
    ("bh", "MG"),
    ("mg", "MG"),
    ("uberlândia", "MG"),
    ("uberlandia", "MG"),
    ("contagem", "MG"),
    ("juiz de fora", "MG"),
    ("betim", "MG"),
    ("uberaba", "MG"),
    ("montes claros", "MG"),
    ("poços de caldas", "MG"),
    ("pocos de caldas", "MG"),
    // Paraná
    ("curitiba", "PR"),
    ("cwb", "PR"),
    ("pr", "PR"),
    ("londrina", "PR"),
    ("maringá", "PR"),
    ("maringa", "PR"),
    ("ponta grossa", "PR"),
    ("cascavel", "PR"),
    ("foz do iguaçu", "PR"),
    ("foz do iguacu", "PR"),
    // Rio Grande do Sul
    ("porto alegre", "RS"),
    ("poa", "RS"),
    ("rs", "RS"),
    ("caxias do sul", "RS"),
    ("pelotas", "RS"),
    ("canoas", "RS"),
    ("santa maria", "RS"),
    ("novo hamburgo", "RS"),
    ("gravataí", "RS"),
    ("gravatai", "RS"),
    // Bahia
    ("salvador", "BA"),
    ("ssa", "BA"),
    ("ba", "BA"),
    ("feira de santana", "BA"),
    ("vitória da conquista", "BA"),
    ("vitoria da conquista", "BA"),
    ("camaçari", "BA"),
    ("camacari", "BA"),
    // Santa Catarina
    ("florianópolis", "SC"),
    ("florianopolis", "SC"),
    ("floripa", "SC"),
    ("sc", "SC"),
    ("joinville", "SC"),
    ("blumenau", "SC"),
    ("balneário camboriú", "SC"),
    ("balneario camboriu", "SC"),
    ("chapecó", "SC"),
    ("chapeco", "SC"),
    // Goiás
    ("goiânia", "GO"),
    ("goiania", "GO"),
    ("go", "GO"),
    ("aparecida de goiânia", "GO"),
    ("aparecida de goiania", "GO"),
    ("anápolis", "GO"),
    ("anapolis", "GO"),
    // Pernambuco
    ("recife", "PE"),
    ("pe", "PE"),
    ("olinda", "PE"),
    ("jaboatão dos guararapes", "PE"),
    ("jaboatao dos guararapes", "PE"),
    // Ceará
    ("fortaleza", "CE"),
    ("ce", "CE"),
    ("caucaia", "CE"),
    ("juazeiro do norte", "CE"),
    // Distrito Federal
    ("brasília", "DF"),
    ("brasilia", "DF"),
    ("df", "DF"),
    // Espírito Santo
    ("vitória", "ES"),
    ("vitoria", "ES"),
    ("es", "ES"),
    ("vila velha", "ES"),
    ("serra", "ES"),
    ("cariacica", "ES"),
    // Pará
    ("belém", "PA"),
    ("belem", "PA"),
    ("pa", "PA"),
    ("ananindeua", "PA"),
    // Maranhão
    ("são luís", "MA"),
    ("sao luis", "MA"),
    ("ma", "MA"),
    // Amazonas
    ("manaus", "AM"),
    ("am", "AM"),
    // Mato Grosso
    ("cuiabá", "MT"),
    ("cuiaba", "MT"),
    ("mt", "MT"),
    ("várzea grande", "MT"),
    ("varzea grande", "MT"),
    // Mato Grosso do Sul
    ("campo grande", "MS"),
    ("ms", "MS"),
    ("dourados", "MS"),
    // Paraíba
    ("joão pessoa", "PB"),
    ("joao pessoa", "PB"),
    ("pb", "PB"),
    ("campina grande", "PB"),
    // Rio Grande do Norte
    ("natal", "RN"),
    ("rn", "RN"),
    ("mossoró", "RN"),
    ("mossoro", "RN"),
    // Alagoas
    ("maceió", "AL"),
    ("maceio", "AL"),
    ("al", "AL"),
    // Piauí
    ("teresina", "PI"),
    ("pi", "PI"),
    // Sergipe
    ("aracaju", "SE"),
    ("se", "SE"),
    // Rondônia
    ("porto velho", "RO"),
    ("ro", "RO"),
    // Tocantins
    ("palmas", "TO"),
    ("to", "TO"),
    // Acre
    ("rio branco", "AC"),
    ("ac", "AC"),
    // Amapá
    ("macapá", "AP"),
    ("macapa", "AP"),
    ("ap", "AP"),
    // Roraima
    ("boa vista", "RR"),
    ("rr", "RR"),
];

/// Full state names (26 states plus the federal district).
const STATE_NAMES: &[(&str, &str)] = &[
    ("acre", "AC"),
    ("alagoas", "AL"),
    ("amapá", "AP"),
    ("amazonas", "AM"),
    ("bahia", "BA"),
    ("ceará", "CE"),
    ("distrito federal", "DF"),
    ("espírito santo", "ES"),
    ("goiás", "GO"),
    ("maranhão", "MA"),
    ("mato grosso", "MT"),
    ("mato grosso do sul", "MS"),
    ("minas gerais", "MG"),
    ("pará", "PA"),
    ("paraíba", "PB"),
    ("paraná", "PR"),
    ("pernambuco", "PE"),
    ("piauí", "PI"),
    ("rio de janeiro", "RJ"),
    ("rio grande do norte", "RN"),
    ("rio grande do sul", "RS"),
    ("rondônia", "RO"),
    ("roraima", "RR"),
    ("santa catarina", "SC"),
    ("são paulo", "SP"),
    ("sergipe", "SE"),
    ("tocantins", "TO"),
];

/// Read-only city → UF and state-name → UF lookups
#[derive(Debug, Clone)]
pub struct AliasTable {
    cities: HashMap<String, &'static str>,
    states: HashMap<String, &'static str>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::from_entries(CITY_ALIASES, STATE_NAMES)
    }
}

impl AliasTable {
    pub fn from_entries(
        cities: &[(&str, &'static str)],
        states: &[(&str, &'static str)],
    ) -> Self {
        let table = Self {
            cities: cities
                .iter()
                .map(|(name, uf)| (name.to_lowercase(), *uf))
                .collect(),
            states: states
                .iter()
                .map(|(name, uf)| (name.to_lowercase(), *uf))
                .collect(),
        };
        tracing::debug!(
            cities = table.cities.len(),
            states = table.states.len(),
            "alias table loaded"
        );
        table
    }

    /// UF for a city name or abbreviation, matched on the whole trimmed input
    pub fn state_for_city(&self, input: &str) -> Option<&'static str> {
        self.cities.get(&input.trim().to_lowercase()).copied()
    }

    /// UF for a full state name, if recognized
    pub fn state_code(&self, state_name: &str) -> Option<&'static str> {
        self.states.get(&state_name.trim().to_lowercase()).copied()
    }

    /// UF for a full state name, degrading to the first two letters uppercased
    pub fn state_abbreviation(&self, state_name: &str) -> String {
        match self.state_code(state_name) {
            Some(uf) => uf.to_string(),
            None => state_name
                .trim()
                .chars()
                .take(2)
                .collect::<String>()
                .to_uppercase(),
        }
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}
