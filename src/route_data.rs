// GO Transit route reference data (codes as published in the GO GTFS)

pub fn route_name(code: &str) -> Option<&'static str> {
    let name = match code {
        // Train lines
        "ST" => "Stouffville",
        "RH" => "Richmond Hill",
        "MI" => "Milton",
        "LW" => "Lakeshore West",
        "LE" => "Lakeshore East",
        "KI" => "Kitchener",
        "BR" => "Barrie",
        "GT" => "GO Train",

        // Bus routes
        "96" => "Oshawa / Finch Express",
        "94" => "Pickering / Square One",
        "92" => "Oshawa / Yorkdale",
        "90" => "Lakeshore East",
        "88" => "Peterborough / Oshawa",
        "71" => "Stouffville",
        "70" => "Uxbridge / Mount Joy",
        "68" => "Barrie / Newmarket",
        "67" => "Keswick / North York",
        "65" => "Newmarket / Toronto",
        "61" => "Richmond Hill",
        "56" => "Oshawa / Oakville",
        "52" => "Oshawa / Hwy 407 Terminal",
        "48" => "Guelph / Hwy 407 Terminal",
        "47" => "Hamilton / Hwy 407 Terminal",
        "41" => "Hamilton / Pickering",
        "40" => "Hamilton / Richmond Hill",
        "38" => "Bolton / Malton",
        "37" => "Orangeville / Brampton",
        "36" => "Brampton / North York Express",
        "33" => "Guelph / North York",
        "32" => "Brampton Trinity Common / North York",
        "31" => "Guelph / Toronto",
        "30" => "Kitchener / Bramalea",
        "29" => "Guelph / Mississauga",
        "27" => "Milton / North York",
        "25" => "Waterloo / Mississauga",
        "22" => "Milton / Oakville",
        "21" => "Milton",
        "19" => "Mississauga / North York",
        "18" => "Lakeshore West",
        "17" => "Waterloo / Hamilton",
        "16" => "Hamilton / Toronto Express",
        "15" => "Brantford / Aldershot",
        "12" => "Niagara Falls / Toronto",
        "11" => "Brock University",
        _ => return None,
    };
    Some(name)
}

/// Full route name for a code, `Route {code}` when the code is unknown.
pub fn get_route_name(code: &str) -> String {
    route_name(&code.trim().to_uppercase())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Route {}", code))
}
